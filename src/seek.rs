//! Repositioning a stream's decoder.
//!
//! A seek moves the container's read cursor to the last keyframe at or
//! before a frame, flushes the stream's decoder and forgets the decode
//! position. The position is re-learned from the first packet read
//! afterwards (see [`decode_loop`](crate::decode_loop)).

use crate::{
    backend::{MediaContainer, VideoDecoder},
    error::FrameSeekError,
    stream::{CursorState, StreamState},
};

/// Seek so that `frame` can be decoded.
///
/// The seek aims `codec_delay` frames early so the decoder has enough
/// lead-in to emit `frame` itself. The decoder is flushed whether or not
/// the container accepted the seek.
pub(crate) fn seek_to_frame<C: MediaContainer>(
    container: &mut C,
    stream: &mut StreamState<C::Decoder>,
    frame: u64,
) -> Result<(), FrameSeekError> {
    let lead_in = u64::from(stream.codec_delay);
    let seek_frame = frame.saturating_sub(lead_in);
    let timestamp = stream.clock.frame_to_pts(seek_frame);

    log::debug!(
        "Seeking stream {} to frame {} (target {}, codec delay {}) at timestamp {}",
        stream.container_index,
        seek_frame,
        frame,
        lead_in,
        timestamp,
    );

    let result = container.seek(stream.container_index, timestamp);
    reposition(stream);

    result.map_err(|error| {
        stream.cursor = CursorState::Unpositioned;
        FrameSeekError::SeekFailed {
            frame,
            reason: error.to_string(),
        }
    })
}

/// Seek back to the first frame of the stream.
pub(crate) fn rewind<C: MediaContainer>(
    container: &mut C,
    stream: &mut StreamState<C::Decoder>,
) -> Result<(), FrameSeekError> {
    log::debug!("Rewinding stream {} to its start", stream.container_index);

    let result = container.seek(stream.container_index, stream.clock.start_pts());
    reposition(stream);

    result.map_err(|error| {
        stream.cursor = CursorState::Unpositioned;
        FrameSeekError::SeekFailed {
            frame: 0,
            reason: error.to_string(),
        }
    })
}

fn reposition<D: VideoDecoder>(stream: &mut StreamState<D>) {
    stream.decoder.flush();
    stream.reset_cursors();
    stream.cursor = CursorState::Seeking;
}
