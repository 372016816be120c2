//! Frame number ↔ timestamp mapping.
//!
//! [`FrameClock`] converts between 0-based frame numbers and timestamps in a
//! stream's native time base, assuming a constant frame duration.
//! [`TimestampBasis`] decides, once per stream, whether presentation or
//! decode timestamps feed that mapping.

use crate::metadata::{FrameRate, TimeBase};

/// Which timestamp field of packets and pictures orders a stream.
///
/// Starts [`Undecided`](TimestampBasis::Undecided). The first packet seen
/// with a valid presentation timestamp fixes
/// [`Presentation`](TimestampBasis::Presentation); needing a timestamp while
/// still undecided fixes [`Decode`](TimestampBasis::Decode). Once fixed, the
/// basis never changes for the life of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampBasis {
    /// No packet has settled the question yet.
    #[default]
    Undecided,
    /// Presentation timestamps are populated and used.
    Presentation,
    /// Presentation timestamps were unavailable; decode timestamps are used.
    Decode,
}

impl TimestampBasis {
    /// Record a packet's presentation timestamp.
    pub fn observe(&mut self, presentation: Option<i64>) {
        if *self == TimestampBasis::Undecided && presentation.is_some() {
            *self = TimestampBasis::Presentation;
        }
    }

    /// Pick the timestamp to map, fixing the basis to
    /// [`Decode`](TimestampBasis::Decode) if it is still undecided.
    pub fn select(&mut self, presentation: Option<i64>, decode: Option<i64>) -> Option<i64> {
        match self {
            TimestampBasis::Presentation => presentation,
            TimestampBasis::Decode => decode,
            TimestampBasis::Undecided => {
                log::debug!("No presentation timestamp seen yet, falling back to decode timestamps");
                *self = TimestampBasis::Decode;
                decode
            }
        }
    }

    /// Returns `true` once the stream is known to carry presentation
    /// timestamps.
    pub fn uses_presentation(self) -> bool {
        self == TimestampBasis::Presentation
    }
}

/// Constant-frame-rate clock of one stream.
///
/// All arithmetic happens in 128-bit integers and rounds half away from
/// zero, so `pts_to_frame(frame_to_pts(f)) == f` for every frame whenever
/// the time base is at least as fine as the frame duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameClock {
    start_pts: i64,
    time_base: TimeBase,
    frame_rate: FrameRate,
}

impl FrameClock {
    /// Create a clock for a stream whose first frame is stamped `start_pts`.
    pub fn new(start_pts: i64, time_base: TimeBase, frame_rate: FrameRate) -> Self {
        Self {
            start_pts,
            time_base,
            frame_rate,
        }
    }

    /// Timestamp of the first frame.
    pub fn start_pts(&self) -> i64 {
        self.start_pts
    }

    /// Time base of the stream's timestamps.
    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Frame rate the mapping assumes.
    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    /// Timestamp at which `frame` starts.
    pub fn frame_to_pts(&self, frame: u64) -> i64 {
        let numerator = i128::from(frame)
            * i128::from(self.frame_rate.denominator)
            * i128::from(self.time_base.denominator);
        let denominator =
            i128::from(self.frame_rate.numerator) * i128::from(self.time_base.numerator);
        let offset = divide_rounded(numerator, denominator);
        saturate(i128::from(self.start_pts) + offset)
    }

    /// Frame index of a timestamp. Negative for timestamps before the start.
    pub fn pts_to_frame(&self, pts: i64) -> i64 {
        let numerator = (i128::from(pts) - i128::from(self.start_pts))
            * i128::from(self.time_base.numerator)
            * i128::from(self.frame_rate.numerator);
        let denominator =
            i128::from(self.time_base.denominator) * i128::from(self.frame_rate.denominator);
        saturate(divide_rounded(numerator, denominator))
    }
}

/// Divide rounding half away from zero. A zero denominator yields zero.
fn divide_rounded(numerator: i128, denominator: i128) -> i128 {
    if denominator == 0 {
        return 0;
    }
    let (numerator, denominator) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };
    if numerator >= 0 {
        (numerator + denominator / 2) / denominator
    } else {
        -((-numerator + denominator / 2) / denominator)
    }
}

fn saturate(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}
