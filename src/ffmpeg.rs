//! FFmpeg process setup and log level control.
//!
//! FFmpeg keeps process-wide state: codec registration and its own logger,
//! which writes to stderr independently of the Rust
//! [`log`](https://crates.io/crates/log) crate. [`initialize`] runs the
//! one-time setup and quiets FFmpeg to warnings; [`set_ffmpeg_log_level`]
//! lines FFmpeg's verbosity up with a `log` level filter.
//!
//! # Example
//!
//! ```no_run
//! use log::LevelFilter;
//!
//! frameseek::initialize()?;
//! // Let FFmpeg report errors only.
//! frameseek::set_ffmpeg_log_level(LevelFilter::Error);
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```

use std::sync::OnceLock;

use ffmpeg_next::util::log::Level;
use log::LevelFilter;

use crate::error::FrameSeekError;

static INITIALIZATION: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize FFmpeg once for the whole process.
///
/// Later calls return the outcome of the first one.
/// [`FfmpegBackend::new`](crate::FfmpegBackend::new) calls this for you.
///
/// # Errors
///
/// Returns [`FrameSeekError::NativeDecodeError`] if FFmpeg failed to
/// initialize.
pub fn initialize() -> Result<(), FrameSeekError> {
    INITIALIZATION
        .get_or_init(|| {
            ffmpeg_next::init().map_err(|error| error.to_string())?;
            ffmpeg_next::util::log::set_level(Level::Warning);
            log::debug!("FFmpeg initialized, native log level set to warning");
            Ok(())
        })
        .clone()
        .map_err(|reason| {
            FrameSeekError::NativeDecodeError(format!("FFmpeg initialisation failed: {reason}"))
        })
}

/// Set FFmpeg's own log verbosity from a `log` level filter.
///
/// `Off` silences FFmpeg, `Debug` maps to FFmpeg's verbose level and
/// `Trace` to its debug level.
pub fn set_ffmpeg_log_level(filter: LevelFilter) {
    ffmpeg_next::util::log::set_level(native_level(filter));
}

/// FFmpeg's current log verbosity as a `log` level filter.
///
/// Returns `None` if FFmpeg reports a level with no counterpart.
pub fn ffmpeg_log_level() -> Option<LevelFilter> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(|level| match level {
            Level::Quiet => LevelFilter::Off,
            Level::Panic | Level::Fatal | Level::Error => LevelFilter::Error,
            Level::Warning => LevelFilter::Warn,
            Level::Info => LevelFilter::Info,
            Level::Verbose => LevelFilter::Debug,
            Level::Debug | Level::Trace => LevelFilter::Trace,
        })
}

fn native_level(filter: LevelFilter) -> Level {
    match filter {
        LevelFilter::Off => Level::Quiet,
        LevelFilter::Error => Level::Error,
        LevelFilter::Warn => Level::Warning,
        LevelFilter::Info => Level::Info,
        LevelFilter::Debug => Level::Verbose,
        LevelFilter::Trace => Level::Debug,
    }
}
