//! Seek/decode attempts for one requested frame.
//!
//! [`RetryPolicy`] decides whether a request can continue from the current
//! decode position or needs a seek, runs up to `max_retries + 1` attempts,
//! walks the seek point backwards when the container lands badly, and
//! finally falls back to the closest frame seen when nearest loading is
//! enabled.

use crate::{
    backend::MediaContainer,
    configuration::{DecodeOptions, RowOrder},
    decode_loop::{self, MissReason, StepOutcome},
    error::FrameSeekError,
    seek,
    stream::{CursorState, StreamState},
};

/// The decoded frame closest to a target, kept aside while retrying.
///
/// Ties go to the earlier frame.
pub(crate) struct NearestFrame<P> {
    target: u64,
    enabled: bool,
    best: Option<(u64, P)>,
}

impl<P> NearestFrame<P> {
    pub(crate) fn new(target: u64, enabled: bool) -> Self {
        Self {
            target,
            enabled,
            best: None,
        }
    }

    /// Keep `picture` if frame `index` is closer to the target than the
    /// best so far.
    ///
    /// The kept picture is swapped out of `picture`; `fresh` supplies a
    /// replacement the first time one is needed.
    pub(crate) fn offer(&mut self, index: i64, picture: &mut P, fresh: impl FnOnce() -> P) {
        if !self.enabled {
            return;
        }
        let Ok(index) = u64::try_from(index) else {
            return;
        };
        if !self.is_closer(index) {
            return;
        }
        match &mut self.best {
            Some((best_index, best_picture)) => {
                std::mem::swap(best_picture, picture);
                *best_index = index;
            }
            None => {
                let mut kept = fresh();
                std::mem::swap(&mut kept, picture);
                self.best = Some((index, kept));
            }
        }
    }

    fn is_closer(&self, index: u64) -> bool {
        match &self.best {
            None => true,
            Some((best, _)) => {
                let distance = index.abs_diff(self.target);
                let best_distance = best.abs_diff(self.target);
                distance < best_distance || (distance == best_distance && index < *best)
            }
        }
    }

    pub(crate) fn index(&self) -> Option<u64> {
        self.best.as_ref().map(|(index, _)| *index)
    }

    pub(crate) fn into_inner(self) -> Option<(u64, P)> {
        self.best
    }
}

/// What made the last attempt fail.
enum Failure {
    NotFound,
    Stalled,
    Seek(FrameSeekError),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    load_nearest: bool,
    max_retries: u32,
    stall_slack: u32,
    row_order: RowOrder,
}

impl RetryPolicy {
    pub(crate) fn from_options(options: &DecodeOptions) -> Self {
        Self {
            load_nearest: options.load_nearest,
            max_retries: options.max_retries,
            stall_slack: options.stall_slack,
            row_order: options.row_order,
        }
    }

    /// Decode `frame` of `stream` into `output` and return the index of the
    /// frame actually delivered.
    ///
    /// This differs from `frame` only when the nearest-frame fallback kicked
    /// in. The caller has already checked that `output` is large enough.
    pub(crate) fn decode<C: MediaContainer>(
        &self,
        container: &mut C,
        stream: &mut StreamState<C::Decoder>,
        frame: u64,
        output: &mut [u8],
    ) -> Result<u64, FrameSeekError> {
        let frame_count = stream.info.frame_count;
        let frame = if frame < frame_count {
            frame
        } else if self.load_nearest && frame_count > 0 {
            log::debug!(
                "Frame {frame} is past the end of stream {}, clamping to {}",
                stream.container_index,
                frame_count - 1
            );
            frame_count - 1
        } else {
            return Err(FrameSeekError::FrameNotFound { frame });
        };

        let attempts = self.max_retries + 1;
        let mut nearest = NearestFrame::new(frame, self.load_nearest);
        let mut failure = Failure::NotFound;
        let mut seek_frame = frame;

        for attempt in 0..attempts {
            if attempt == 0 && stream.is_positioned_at(frame) {
                log::trace!("Continuing sequential decode at frame {frame}");
            } else if let Err(error) = seek::seek_to_frame(container, stream, seek_frame) {
                log::warn!("{error}, rewinding stream {}", stream.container_index);
                if let Err(error) = seek::rewind(container, stream) {
                    log::warn!("{error}");
                    failure = Failure::Seek(error);
                    continue;
                }
            }

            let outcome =
                decode_loop::step_until(container, stream, frame, self.stall_slack, &mut nearest)?;

            let walk_back = match outcome {
                StepOutcome::Matched => {
                    stream
                        .convert_current(output, self.row_order)
                        .map_err(FrameSeekError::native)?;
                    stream.mark_matched(frame);
                    if attempt > 0 {
                        log::debug!("Frame {frame} decoded on attempt {}", attempt + 1);
                    }
                    return Ok(frame);
                }
                StepOutcome::Stalled => {
                    failure = Failure::Stalled;
                    !stream.produced_since_seek
                }
                StepOutcome::Missed(reason) => {
                    failure = Failure::NotFound;
                    matches!(reason, MissReason::LandedPast { .. })
                }
            };

            let earlier = stream
                .landing
                .filter(|_| walk_back)
                .and_then(|landing| landing.min(seek_frame).checked_sub(1));
            seek_frame = match earlier {
                Some(earlier) => {
                    log::debug!(
                        "Seek landed late, retrying from frame {earlier} (attempt {} of {attempts})",
                        attempt + 2
                    );
                    earlier
                }
                None => frame,
            };
            stream.cursor = CursorState::Unpositioned;
        }

        if let Some(index) = nearest.index() {
            log::warn!(
                "Frame {frame} could not be decoded after {attempts} attempts, returning nearest frame {index}"
            );
        }
        if let Some((index, picture)) = nearest.into_inner() {
            stream
                .convert_picture(&picture, output, self.row_order)
                .map_err(FrameSeekError::native)?;
            stream.cursor = CursorState::Missed;
            return Ok(index);
        }

        Err(match failure {
            Failure::Stalled => FrameSeekError::DecodeStalled { frame, attempts },
            Failure::Seek(error) => error,
            Failure::NotFound => FrameSeekError::FrameNotFound { frame },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_prefers_smaller_distance() {
        let mut nearest = NearestFrame::new(8, true);
        let mut picture = 3_u32;
        nearest.offer(3, &mut picture, || 0);
        let mut picture = 5_u32;
        nearest.offer(5, &mut picture, || 0);
        let mut picture = 1_u32;
        nearest.offer(1, &mut picture, || 0);
        assert_eq!(nearest.into_inner(), Some((5, 5)));
    }

    #[test]
    fn nearest_tie_goes_to_earlier_frame() {
        let mut nearest = NearestFrame::new(10, true);
        let mut picture = 12_u32;
        nearest.offer(12, &mut picture, || 0);
        let mut picture = 8_u32;
        nearest.offer(8, &mut picture, || 0);
        assert_eq!(nearest.index(), Some(8));
    }

    #[test]
    fn disabled_tracker_keeps_nothing() {
        let mut nearest = NearestFrame::new(4, false);
        let mut picture = 3_u32;
        nearest.offer(3, &mut picture, || 0);
        assert_eq!(picture, 3);
        assert!(nearest.into_inner().is_none());
    }

    #[test]
    fn swapped_picture_is_replaced() {
        let mut nearest = NearestFrame::new(4, true);
        let mut picture = 3_u32;
        nearest.offer(3, &mut picture, || 99);
        assert_eq!(picture, 99);
        let mut picture = 4_u32;
        nearest.offer(4, &mut picture, || 99);
        // The previous best moves back into the caller's slot.
        assert_eq!(picture, 3);
    }
}
