//! Decode configuration.
//!
//! [`DecodeOptions`] is a builder that carries the per-call knobs of
//! [`MediaFile::decode_with`](crate::MediaFile::decode_with): retry budget,
//! nearest-frame fallback, stream selection, stall slack and output row
//! order.
//!
//! # Example
//!
//! ```no_run
//! use frameseek::{DecodeOptions, MediaFile, RowOrder};
//!
//! # #[cfg(feature = "ffmpeg")]
//! # fn main() -> Result<(), frameseek::FrameSeekError> {
//! let file = MediaFile::open_path("input.mov")?;
//! let info = file.info(0)?;
//! let mut buffer = vec![0u8; info.rgb_buffer_len()];
//!
//! let options = DecodeOptions::new()
//!     .with_load_nearest(true)
//!     .with_max_retries(4)
//!     .with_row_order(RowOrder::BottomUp);
//! file.decode_with(&mut buffer, 120, &options)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ffmpeg"))]
//! # fn main() {}
//! ```

/// Retries per frame when nothing else is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Largest accepted retry budget; larger values are clamped.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Packets beyond the codec delay tolerated without output.
pub const DEFAULT_STALL_SLACK: u32 = 2;

/// Vertical orientation of rows written into the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// First row in the buffer is the top of the picture.
    #[default]
    TopDown,
    /// First row in the buffer is the bottom of the picture (OpenFX style).
    BottomUp,
}

/// Options for a single decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Return the closest decodable frame instead of failing.
    pub(crate) load_nearest: bool,
    /// Extra seek/decode attempts after the first one.
    pub(crate) max_retries: u32,
    /// Index into the file's decodable video streams.
    pub(crate) stream_index: usize,
    /// Orientation of the output rows.
    pub(crate) row_order: RowOrder,
    /// Tolerance added to the codec delay before a stall is declared.
    pub(crate) stall_slack: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeOptions {
    /// Create options with default settings.
    ///
    /// Defaults: exact frames only, 10 retries, stream 0, top-down rows,
    /// stall slack of 2 packets.
    pub fn new() -> Self {
        Self {
            load_nearest: false,
            max_retries: DEFAULT_MAX_RETRIES,
            stream_index: 0,
            row_order: RowOrder::TopDown,
            stall_slack: DEFAULT_STALL_SLACK,
        }
    }

    /// Fall back to the nearest decoded frame when the exact one cannot be
    /// produced, and clamp out-of-range requests to the last frame.
    #[must_use]
    pub fn with_load_nearest(mut self, load_nearest: bool) -> Self {
        self.load_nearest = load_nearest;
        self
    }

    /// Set how many extra attempts are made after the first one fails.
    ///
    /// Clamped to [`MAX_RETRIES_LIMIT`].
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.min(MAX_RETRIES_LIMIT);
        self
    }

    /// Select which decodable video stream to read.
    #[must_use]
    pub fn with_stream(mut self, stream_index: usize) -> Self {
        self.stream_index = stream_index;
        self
    }

    /// Set the orientation of rows in the output buffer.
    #[must_use]
    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    /// Set how many packets past the codec delay may go without output.
    #[must_use]
    pub fn with_stall_slack(mut self, slack: u32) -> Self {
        self.stall_slack = slack;
        self
    }

    /// Whether the nearest-frame fallback is enabled.
    pub fn load_nearest(&self) -> bool {
        self.load_nearest
    }

    /// Retry budget after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Selected stream.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Output row orientation.
    pub fn row_order(&self) -> RowOrder {
        self.row_order
    }

    /// Stall tolerance in packets.
    pub fn stall_slack(&self) -> u32 {
        self.stall_slack
    }
}
