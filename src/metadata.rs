//! Stream metadata types.
//!
//! These are the values returned by [`MediaFile::info`](crate::MediaFile::info),
//! [`MediaFile::frame_rate`](crate::MediaFile::frame_rate) and
//! [`MediaFile::stream_metadata`](crate::MediaFile::stream_metadata). They are
//! derived once per [`open`](crate::MediaFile::open) and re-derived on every
//! reopen.

use crate::timestamp::TimestampBasis;

/// Frame rate as an exact rational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    /// Frames per `denominator` seconds.
    pub numerator: i32,
    /// Seconds per `numerator` frames.
    pub denominator: i32,
}

impl FrameRate {
    /// Create a frame rate of `numerator / denominator` frames per second.
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Returns `true` if both terms are non-zero.
    pub fn is_valid(self) -> bool {
        self.numerator != 0 && self.denominator != 0
    }

    /// Frames per second as a float.
    pub fn as_f64(self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            f64::from(self.numerator) / f64::from(self.denominator)
        }
    }
}

impl Default for FrameRate {
    /// One frame per second, used when a stream declares no rate.
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Unit of a stream's timestamps, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    /// Numerator of the tick length.
    pub numerator: i32,
    /// Denominator of the tick length.
    pub denominator: i32,
}

impl TimeBase {
    /// Create a time base of `numerator / denominator` seconds per tick.
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

/// Opaque identifier of a backend's native pixel layout.
///
/// For the FFmpeg backend this is the raw `AVPixelFormat` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePixelFormat(pub i32);

/// Geometry and length of a video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct StreamInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel aspect ratio (width of a pixel over its height).
    pub pixel_aspect: f64,
    /// Total number of frames.
    pub frame_count: u64,
}

impl StreamInfo {
    /// Bytes needed for one packed RGB picture of this stream.
    pub fn rgb_buffer_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Everything the engine knows about one video stream.
#[derive(Debug, Clone)]
#[must_use]
pub struct StreamMetadata {
    /// Index of the stream inside the container.
    pub container_index: usize,
    /// Codec name (e.g. `"h264"`, `"prores"`).
    pub codec: String,
    /// Geometry and length.
    pub info: StreamInfo,
    /// Frame rate used for the frame ↔ timestamp mapping.
    pub frame_rate: FrameRate,
    /// Time base of the stream's timestamps.
    pub time_base: TimeBase,
    /// Timestamp of frame 0.
    pub start_pts: i64,
    /// Input packets the decoder currently needs before it emits output.
    pub codec_delay: u32,
    /// Which timestamps order this stream.
    pub timestamp_basis: TimestampBasis,
    /// Native pixel layout of decoded pictures.
    pub pixel_format: NativePixelFormat,
}
