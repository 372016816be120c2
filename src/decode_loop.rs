//! Feeding packets until a target frame comes out.
//!
//! [`step_until`] drives one decode attempt: it drains the decoder, reads
//! the next packet of the stream, feeds it and repeats until the target
//! frame is produced, a later frame proves it was skipped, the input ends,
//! or the decoder stops producing output for longer than its declared
//! delay allows.

use std::cmp::Ordering;

use crate::{
    backend::{CompressedPacket, MediaContainer, VideoDecoder},
    error::FrameSeekError,
    retry::NearestFrame,
    stream::{CursorState, StreamState},
};

/// How a decode attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// The target frame is in the stream's current picture.
    Matched,
    /// More than `codec_delay + slack` packets went in without output.
    Stalled,
    /// The target frame will not come out of this attempt.
    Missed(MissReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MissReason {
    /// A later frame came out first.
    Overshot { frame: i64 },
    /// The seek landed after the target.
    LandedPast { landing: u64 },
    /// The input ended and the decoder is drained.
    EndOfStream,
}

enum Feed {
    Packet,
    EndOfInput,
    LandedPast(u64),
}

pub(crate) type PictureOf<C> = <<C as MediaContainer>::Decoder as VideoDecoder>::Picture;

/// Decode forward from the current position until `target` is produced.
///
/// Every picture before or after the target is offered to `nearest`.
/// Read, send and receive failures are returned as
/// [`FrameSeekError::NativeDecodeError`].
pub(crate) fn step_until<C: MediaContainer>(
    container: &mut C,
    stream: &mut StreamState<C::Decoder>,
    target: u64,
    stall_slack: u32,
    nearest: &mut NearestFrame<PictureOf<C>>,
) -> Result<StepOutcome, FrameSeekError> {
    let target_index = i64::try_from(target).unwrap_or(i64::MAX);
    let mut fed = false;

    loop {
        let mut produced = false;
        while stream
            .decoder
            .receive_picture(&mut stream.picture)
            .map_err(FrameSeekError::native)?
        {
            produced = true;
            stream.produced_since_seek = true;
            stream.stall_counter = 0;

            let Some(index) = stream.picture_frame_index() else {
                log::trace!(
                    "Discarding picture without a usable timestamp on stream {}",
                    stream.container_index
                );
                continue;
            };
            stream.next_frame_out = frame_after(index);

            match index.cmp(&target_index) {
                Ordering::Equal => {
                    log::trace!("Decoded frame {target}");
                    return Ok(StepOutcome::Matched);
                }
                Ordering::Less => stream.offer_picture(index, nearest),
                Ordering::Greater => {
                    log::debug!("Decoder skipped from before frame {target} to frame {index}");
                    stream.offer_picture(index, nearest);
                    stream.cursor = CursorState::Missed;
                    return Ok(StepOutcome::Missed(MissReason::Overshot { frame: index }));
                }
            }
        }

        if fed && !produced {
            stream.stall_counter += 1;
            let limit = stream.codec_delay + stall_slack;
            if stream.stall_counter > limit {
                log::warn!(
                    "Decoder of stream {} produced nothing for {} packets (codec delay {}) looking for frame {}",
                    stream.container_index,
                    stream.stall_counter,
                    stream.codec_delay,
                    target,
                );
                stream.cursor = CursorState::Stalled;
                return Ok(StepOutcome::Stalled);
            }
        }

        if stream.input_exhausted {
            log::debug!(
                "End of stream {} reached before frame {}",
                stream.container_index,
                target
            );
            stream.cursor = CursorState::Missed;
            return Ok(StepOutcome::Missed(MissReason::EndOfStream));
        }

        match feed_next_packet(container, stream, target)? {
            Feed::Packet => fed = true,
            Feed::EndOfInput => fed = false,
            Feed::LandedPast(landing) => {
                log::debug!("Seek for frame {target} landed on frame {landing}");
                stream.cursor = CursorState::Missed;
                return Ok(StepOutcome::Missed(MissReason::LandedPast { landing }));
            }
        }
    }
}

/// Index following picture `index`, if representable.
///
/// Corrupt timestamps can map to `i64::MAX` or below zero.
fn frame_after(index: i64) -> Option<u64> {
    index
        .checked_add(1)
        .and_then(|next| u64::try_from(next).ok())
}

/// Read packets until one belongs to the stream and feed it, or signal end
/// of input to the decoder.
fn feed_next_packet<C: MediaContainer>(
    container: &mut C,
    stream: &mut StreamState<C::Decoder>,
    target: u64,
) -> Result<Feed, FrameSeekError> {
    stream.cursor = CursorState::Feeding;
    loop {
        let Some(packet) = container.read_packet().map_err(FrameSeekError::native)? else {
            log::trace!("End of input on stream {}", stream.container_index);
            stream.decoder.send_eof().map_err(FrameSeekError::native)?;
            stream.input_exhausted = true;
            stream.next_frame_in = Some(stream.info.frame_count);
            return Ok(Feed::EndOfInput);
        };
        if packet.stream_index() != stream.container_index {
            continue;
        }

        let presentation = packet.presentation_timestamp();
        stream.basis.observe(presentation);

        if stream.next_frame_in.is_none() {
            if let Some(timestamp) = stream.basis.select(presentation, packet.decode_timestamp()) {
                let landing = u64::try_from(stream.clock.pts_to_frame(timestamp)).unwrap_or(0);
                stream.landing = Some(landing);
                stream.next_frame_in = Some(landing);
                // Packets already fed without output precede the landing
                // frame and come out first.
                stream.next_frame_out =
                    Some(landing.saturating_sub(u64::from(stream.stall_counter)));
                if landing > target {
                    return Ok(Feed::LandedPast(landing));
                }
            }
        }

        stream.decoder.send_packet(&packet).map_err(FrameSeekError::native)?;
        stream.next_frame_in = stream
            .next_frame_in
            .map(|frame| (frame + 1).min(stream.info.frame_count));
        stream.refresh_codec_delay();
        return Ok(Feed::Packet);
    }
}
