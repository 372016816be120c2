//! Error types for the `frameseek` crate.
//!
//! [`FrameSeekError`] is the unified error returned by every fallible
//! operation on [`MediaFile`](crate::MediaFile). [`BackendError`] is the
//! narrower error a decoding backend reports through the contract in
//! [`backend`](crate::backend); the engine converts it at the boundary,
//! attaching the frame or path it was working on.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `frameseek` operations.
///
/// Variants fall in two groups. Terminal errors ([`OpenFailed`],
/// [`NoVideoStream`], [`NativeDecodeError`]) invalidate the file until it is
/// closed and reopened. All other variants leave the file usable.
///
/// [`OpenFailed`]: FrameSeekError::OpenFailed
/// [`NoVideoStream`]: FrameSeekError::NoVideoStream
/// [`NativeDecodeError`]: FrameSeekError::NativeDecodeError
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameSeekError {
    /// The media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    OpenFailed {
        /// Path that was passed to [`crate::MediaFile::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a decodable video stream.
    #[error("No decodable video stream found in file")]
    NoVideoStream,

    /// The native decoder reported an error while reading or decoding.
    #[error("Native decoder error: {0}")]
    NativeDecodeError(String),

    /// The container refused to seek.
    #[error("Failed to seek to frame {frame}: {reason}")]
    SeekFailed {
        /// Frame the seek was aiming for.
        frame: u64,
        /// Underlying reason reported by the container.
        reason: String,
    },

    /// Decoding made no progress within the codec delay on every attempt.
    #[error("Decoding stalled while looking for frame {frame} ({attempts} attempts), possibly a corrupt file")]
    DecodeStalled {
        /// The frame that was requested.
        frame: u64,
        /// Number of seek/decode attempts made.
        attempts: u32,
    },

    /// The requested frame could not be located.
    #[error("Missing frame {frame}")]
    FrameNotFound {
        /// The frame that was requested.
        frame: u64,
    },

    /// An operation needing an open file was called on a closed one.
    #[error("No media file is open")]
    FileNotOpen,

    /// A previous terminal error left the file unusable.
    #[error("Media file is in an invalid state: {0}")]
    InvalidState(String),

    /// The requested stream index is out of range.
    #[error("Stream {stream_index} is out of range (file has {stream_count} video streams)")]
    StreamOutOfRange {
        /// Requested stream index.
        stream_index: usize,
        /// Number of decodable video streams.
        stream_count: usize,
    },

    /// The caller's buffer cannot hold a full RGB picture.
    #[error("Output buffer holds {actual} bytes but {required} are required")]
    BufferTooSmall {
        /// Bytes needed (`width * height * 3`).
        required: usize,
        /// Bytes provided.
        actual: usize,
    },

    /// An error from the `image` crate while building or saving a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// An I/O error occurred while writing output files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

impl FrameSeekError {
    /// Returns `true` for errors that leave the file unusable until it is
    /// reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FrameSeekError::OpenFailed { .. }
                | FrameSeekError::NoVideoStream
                | FrameSeekError::NativeDecodeError(_)
        )
    }

    /// Wrap a backend failure that happened while reading, decoding or
    /// converting.
    pub(crate) fn native(error: BackendError) -> Self {
        FrameSeekError::NativeDecodeError(error.to_string())
    }

    /// Returns `true` when the error means "this frame could not be
    /// produced", whether the decoder stalled or the frame never appeared.
    pub fn is_missing_frame(&self) -> bool {
        matches!(
            self,
            FrameSeekError::FrameNotFound { .. } | FrameSeekError::DecodeStalled { .. }
        )
    }
}

/// Errors reported by a decoding backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The path does not exist.
    #[error("No such file: {0}")]
    NotFound(PathBuf),

    /// The container format could not be recognised.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The container has no video stream the backend can decode.
    #[error("No decodable video stream")]
    NoDecodableStream,

    /// Any other failure from the native library.
    #[error("{message} (code {code})")]
    Native {
        /// Native error code, negative for FFmpeg `AVERROR`s.
        code: i32,
        /// Human-readable description.
        message: String,
    },
}

impl BackendError {
    /// Build a [`BackendError::Native`] from a code and message.
    pub fn native(code: i32, message: impl Into<String>) -> Self {
        BackendError::Native {
            code,
            message: message.into(),
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for BackendError {
    fn from(error: ffmpeg_next::Error) -> Self {
        let message = error.to_string();
        let code: i32 = error.into();
        BackendError::Native { code, message }
    }
}
