//! # frameseek
//!
//! Frame-accurate random access into compressed video.
//!
//! `frameseek` answers "give me frame N as packed RGB" for any frame of a
//! video stream, in any order. Decoders only start at keyframes, may hold
//! several packets before emitting a picture, and containers often seek
//! imprecisely; the engine seeks to the right keyframe, feeds the decoder
//! until the requested frame comes out, detects stalls and missed frames,
//! retries with earlier seek points, and optionally falls back to the
//! nearest frame it could decode. Requests for consecutive frames continue
//! decoding without seeking.
//!
//! Decoding is powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate behind the
//! [`backend`] contract, which other decoders can implement too.
//!
//! ## Quick Start
//!
//! ### Decode a Frame into a Buffer
//!
//! ```no_run
//! use frameseek::MediaFile;
//!
//! # #[cfg(feature = "ffmpeg")]
//! # fn main() -> Result<(), frameseek::FrameSeekError> {
//! let file = MediaFile::open_path("input.mov")?;
//! let info = file.info(0)?;
//! let mut buffer = vec![0u8; info.rgb_buffer_len()];
//! file.decode(&mut buffer, 42, false, 10, 0)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ffmpeg"))]
//! # fn main() {}
//! ```
//!
//! ### Save a Frame as an Image
//!
//! ```no_run
//! use frameseek::{DecodeOptions, MediaFile};
//!
//! # #[cfg(feature = "ffmpeg")]
//! # fn main() -> Result<(), frameseek::FrameSeekError> {
//! let file = MediaFile::open_path("input.mp4")?;
//! let options = DecodeOptions::new().with_load_nearest(true);
//! file.save_frame(1_000, "frame_1000.png", &options)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ffmpeg"))]
//! # fn main() {}
//! ```
//!
//! ## Features
//!
//! - **Exact frames**: frame numbers map to timestamps through each
//!   stream's frame rate and time base
//! - **Sequential fast path**: in-order requests never seek
//! - **Stall and miss detection**: bounded by the codec's own delay
//! - **Retries**: seek points walk backwards when a seek lands badly
//! - **Nearest-frame fallback**: optional, with out-of-range clamping
//! - **Thread-safe handle**: every operation is serialized on one lock
//! - **Pluggable decoding**: the [`backend`] traits keep the engine
//!   independent of FFmpeg
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | FFmpeg backend and the `frameseek` CLI (enabled by default) |
//!
//! ## Requirements
//!
//! With the `ffmpeg` feature, FFmpeg development libraries must be installed
//! on your system.

pub mod backend;
pub mod configuration;
pub mod conversion;
mod decode_loop;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_backend;
pub mod media_file;
pub mod metadata;
mod retry;
mod seek;
mod stream;
pub mod timestamp;

pub use backend::{
    CompressedPacket, DecodedPicture, MediaBackend, MediaContainer, PictureConverter,
    StreamDescriptor, VideoDecoder,
};
pub use configuration::{DecodeOptions, RowOrder};
pub use conversion::{OutputFormat, ScalerKey, copy_packed_rows};
pub use error::{BackendError, FrameSeekError};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{ffmpeg_log_level, initialize, set_ffmpeg_log_level};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_backend::{FfmpegBackend, FfmpegContainer, FfmpegConverter, FfmpegDecoder};
pub use media_file::MediaFile;
pub use metadata::{FrameRate, NativePixelFormat, StreamInfo, StreamMetadata, TimeBase};
pub use timestamp::{FrameClock, TimestampBasis};
