//! Core [`MediaFile`] implementation.
//!
//! `MediaFile` is the main entry point for the crate. It opens a container,
//! prepares every decodable video stream and serves frame requests. All
//! state sits behind one mutex, so a `MediaFile` can be shared between
//! threads and every public operation runs as one indivisible unit.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

use image::RgbImage;
use parking_lot::Mutex;

use crate::{
    backend::{MediaBackend, MediaContainer},
    configuration::{DecodeOptions, RowOrder},
    error::{BackendError, FrameSeekError},
    metadata::{FrameRate, StreamInfo, StreamMetadata},
    retry::RetryPolicy,
    stream::{CursorState, StreamState},
};

#[cfg(feature = "ffmpeg")]
use crate::ffmpeg_backend::FfmpegBackend;

/// A media file opened for frame-accurate random access.
///
/// Created closed with [`with_backend`](MediaFile::with_backend) (or
/// [`new`](MediaFile::new) for FFmpeg), then opened with
/// [`open`](MediaFile::open). Every method takes `&self`; calls from
/// different threads are serialized.
///
/// A failed open or a native decoder failure leaves the file *invalid*:
/// it still counts as open, but every query fails with
/// [`FrameSeekError::InvalidState`] until [`close`](MediaFile::close) or a
/// successful reopen.
///
/// # Example
///
/// ```no_run
/// use frameseek::{FrameSeekError, MediaFile};
///
/// # #[cfg(feature = "ffmpeg")]
/// # fn main() -> Result<(), FrameSeekError> {
/// let file = MediaFile::open_path("input.mov")?;
/// let info = file.info(0)?;
/// let mut buffer = vec![0u8; info.rgb_buffer_len()];
///
/// for frame in 0..info.frame_count {
///     file.decode(&mut buffer, frame, false, 10, 0)?;
/// }
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "ffmpeg"))]
/// # fn main() {}
/// ```
pub struct MediaFile<B: MediaBackend> {
    backend: B,
    inner: Mutex<FileInner<B::Container>>,
}

struct FileInner<C: MediaContainer> {
    path: Option<PathBuf>,
    state: FileState<C>,
    last_error: Option<String>,
}

enum FileState<C: MediaContainer> {
    Closed,
    Open(OpenFile<C>),
    Invalid,
}

struct OpenFile<C: MediaContainer> {
    /// Dropped before the container that fed them.
    streams: Vec<StreamState<C::Decoder>>,
    container: C,
    /// Stream whose decode last moved the container's read cursor.
    last_stream: Option<usize>,
}

impl<B: MediaBackend + Debug> Debug for MediaFile<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let inner = self.inner.lock();
        let state = match &inner.state {
            FileState::Closed => "closed",
            FileState::Open(_) => "open",
            FileState::Invalid => "invalid",
        };
        let stream_count = match &inner.state {
            FileState::Open(file) => file.streams.len(),
            _ => 0,
        };
        f.debug_struct("MediaFile")
            .field("backend", &self.backend)
            .field("path", &inner.path)
            .field("state", &state)
            .field("stream_count", &stream_count)
            .field("last_error", &inner.last_error)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "ffmpeg")]
impl MediaFile<FfmpegBackend> {
    /// Create a closed file backed by FFmpeg.
    ///
    /// Initializes FFmpeg on first use.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::NativeDecodeError`] if FFmpeg fails to
    /// initialize.
    pub fn new() -> Result<Self, FrameSeekError> {
        Ok(Self::with_backend(FfmpegBackend::new()?))
    }

    /// Create a file backed by FFmpeg and open `path`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`new`](MediaFile::new) or
    /// [`open`](MediaFile::open).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use frameseek::{FrameSeekError, MediaFile};
    ///
    /// let file = MediaFile::open_path("clip.mp4")?;
    /// println!("{} video streams", file.stream_count());
    /// # Ok::<(), FrameSeekError>(())
    /// ```
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, FrameSeekError> {
        let file = Self::new()?;
        file.open(path)?;
        Ok(file)
    }
}

impl<B: MediaBackend> MediaFile<B> {
    /// Create a closed file that opens containers through `backend`.
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            inner: Mutex::new(FileInner {
                path: None,
                state: FileState::Closed,
                last_error: None,
            }),
        }
    }

    /// The backend this file opens containers with.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open the container at `path`, closing whatever was open before.
    ///
    /// Every decodable video stream gets its own decoder; streams whose
    /// decoder cannot be opened are skipped. Frame count, frame rate,
    /// start timestamp and pixel aspect are derived here.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::OpenFailed`] if the container cannot be
    /// opened or [`FrameSeekError::NoVideoStream`] if no video stream can be
    /// decoded. Either leaves the file invalid.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<(), FrameSeekError> {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        inner.release();

        log::debug!("Opening media file: {}", path.display());
        inner.path = Some(path.to_path_buf());

        match OpenFile::open(&self.backend, path) {
            Ok(file) => {
                log::info!(
                    "Opened {} with {} video stream(s)",
                    path.display(),
                    file.streams.len()
                );
                inner.state = FileState::Open(file);
                Ok(())
            }
            Err(error) => {
                inner.invalidate(&error);
                Err(error)
            }
        }
    }

    /// Release the container and every decoder. Closing a closed file is a
    /// no-op.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, FileState::Closed) {
            log::debug!("Closing media file");
        }
        inner.release();
    }

    /// Returns `true` after an open was attempted and until
    /// [`close`](MediaFile::close), even if that open failed.
    pub fn is_open(&self) -> bool {
        !matches!(self.inner.lock().state, FileState::Closed)
    }

    /// Returns `true` if the file is open and no terminal error occurred.
    pub fn is_valid(&self) -> bool {
        matches!(self.inner.lock().state, FileState::Open(_))
    }

    /// Message of the most recent error, kept until the file is closed or
    /// successfully reopened.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Path passed to the last [`open`](MediaFile::open), if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    /// Number of decodable video streams; 0 unless the file is valid.
    pub fn stream_count(&self) -> usize {
        match &self.inner.lock().state {
            FileState::Open(file) => file.streams.len(),
            _ => 0,
        }
    }

    /// Geometry and frame count of a stream.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::FileNotOpen`],
    /// [`FrameSeekError::InvalidState`] or
    /// [`FrameSeekError::StreamOutOfRange`].
    pub fn info(&self, stream_index: usize) -> Result<StreamInfo, FrameSeekError> {
        let inner = self.inner.lock();
        Ok(inner.open_file()?.stream(stream_index)?.info)
    }

    /// Frame rate of a stream as an exact rational.
    ///
    /// # Errors
    ///
    /// Same as [`info`](MediaFile::info).
    pub fn frame_rate(&self, stream_index: usize) -> Result<FrameRate, FrameSeekError> {
        let inner = self.inner.lock();
        Ok(inner.open_file()?.stream(stream_index)?.frame_rate())
    }

    /// Everything known about a stream, including its codec, time base and
    /// current codec delay.
    ///
    /// # Errors
    ///
    /// Same as [`info`](MediaFile::info).
    pub fn stream_metadata(&self, stream_index: usize) -> Result<StreamMetadata, FrameSeekError> {
        let inner = self.inner.lock();
        Ok(inner.open_file()?.stream(stream_index)?.metadata())
    }

    /// Decode `frame` of `stream_index` into `buffer` as packed RGB24,
    /// top row first.
    ///
    /// Shorthand for [`decode_with`](MediaFile::decode_with).
    ///
    /// # Errors
    ///
    /// See [`decode_with`](MediaFile::decode_with).
    pub fn decode(
        &self,
        buffer: &mut [u8],
        frame: u64,
        load_nearest: bool,
        max_retries: u32,
        stream_index: usize,
    ) -> Result<u64, FrameSeekError> {
        let options = DecodeOptions::new()
            .with_load_nearest(load_nearest)
            .with_max_retries(max_retries)
            .with_stream(stream_index);
        self.decode_with(buffer, frame, &options)
    }

    /// Decode one frame into `buffer` as packed RGB24.
    ///
    /// Consecutive requests for consecutive frames continue decoding without
    /// seeking. Returns the index of the frame written, which differs from
    /// `frame` only when [`DecodeOptions::with_load_nearest`] substituted
    /// the closest decodable frame.
    ///
    /// # Errors
    ///
    /// - [`FrameSeekError::FileNotOpen`] / [`FrameSeekError::InvalidState`]
    ///   when no valid file is open.
    /// - [`FrameSeekError::StreamOutOfRange`] for a bad stream index.
    /// - [`FrameSeekError::BufferTooSmall`] if `buffer` is shorter than
    ///   `width * height * 3`.
    /// - [`FrameSeekError::FrameNotFound`], [`FrameSeekError::DecodeStalled`]
    ///   or [`FrameSeekError::SeekFailed`] when every attempt failed.
    /// - [`FrameSeekError::NativeDecodeError`] when the decoder failed; the
    ///   file becomes invalid.
    pub fn decode_with(
        &self,
        buffer: &mut [u8],
        frame: u64,
        options: &DecodeOptions,
    ) -> Result<u64, FrameSeekError> {
        let mut inner = self.inner.lock();
        let result = inner.decode(buffer, frame, options);
        if let Err(error) = &result {
            inner.record(error);
        }
        result
    }

    /// Decode one frame into a new [`RgbImage`].
    ///
    /// The row order in `options` is ignored; images are always top-down.
    ///
    /// # Errors
    ///
    /// Same as [`decode_with`](MediaFile::decode_with).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use frameseek::{DecodeOptions, FrameSeekError, MediaFile};
    ///
    /// # #[cfg(feature = "ffmpeg")]
    /// # fn main() -> Result<(), FrameSeekError> {
    /// let file = MediaFile::open_path("input.mp4")?;
    /// let image = file.frame_image(48, &DecodeOptions::new())?;
    /// println!("{}x{}", image.width(), image.height());
    /// # Ok(())
    /// # }
    /// # #[cfg(not(feature = "ffmpeg"))]
    /// # fn main() {}
    /// ```
    pub fn frame_image(
        &self,
        frame: u64,
        options: &DecodeOptions,
    ) -> Result<RgbImage, FrameSeekError> {
        let options = options.clone().with_row_order(RowOrder::TopDown);
        let mut inner = self.inner.lock();
        let info = inner.open_file()?.stream(options.stream_index)?.info;

        let mut buffer = vec![0u8; info.rgb_buffer_len()];
        if let Err(error) = inner.decode(&mut buffer, frame, &options) {
            inner.record(&error);
            return Err(error);
        }

        let actual = buffer.len();
        RgbImage::from_raw(info.width, info.height, buffer).ok_or(FrameSeekError::BufferTooSmall {
            required: info.rgb_buffer_len(),
            actual,
        })
    }

    /// Decode one frame and save it to `path`; the format follows the
    /// extension.
    ///
    /// # Errors
    ///
    /// Any error from [`frame_image`](MediaFile::frame_image), or
    /// [`FrameSeekError::ImageError`] if the image cannot be written.
    pub fn save_frame<P: AsRef<Path>>(
        &self,
        frame: u64,
        path: P,
        options: &DecodeOptions,
    ) -> Result<(), FrameSeekError> {
        let image = self.frame_image(frame, options)?;
        image.save(path.as_ref())?;
        log::debug!("Saved frame {frame} to {}", path.as_ref().display());
        Ok(())
    }
}

impl<C: MediaContainer> FileInner<C> {
    /// Drop native resources and forget the path and last error.
    fn release(&mut self) {
        self.state = FileState::Closed;
        self.path = None;
        self.last_error = None;
    }

    fn invalidate(&mut self, error: &FrameSeekError) {
        log::error!("{error}");
        self.state = FileState::Invalid;
        self.last_error = Some(error.to_string());
    }

    fn record(&mut self, error: &FrameSeekError) {
        match error {
            FrameSeekError::FileNotOpen | FrameSeekError::InvalidState(_) => {}
            error if error.is_terminal() => self.invalidate(error),
            error => self.last_error = Some(error.to_string()),
        }
    }

    fn open_file(&self) -> Result<&OpenFile<C>, FrameSeekError> {
        match &self.state {
            FileState::Open(file) => Ok(file),
            FileState::Closed => Err(FrameSeekError::FileNotOpen),
            FileState::Invalid => Err(self.invalid_state()),
        }
    }

    fn invalid_state(&self) -> FrameSeekError {
        FrameSeekError::InvalidState(self.last_error.clone().unwrap_or_default())
    }

    fn decode(
        &mut self,
        buffer: &mut [u8],
        frame: u64,
        options: &DecodeOptions,
    ) -> Result<u64, FrameSeekError> {
        if matches!(self.state, FileState::Invalid) {
            return Err(self.invalid_state());
        }
        let FileState::Open(file) = &mut self.state else {
            return Err(FrameSeekError::FileNotOpen);
        };

        let required = file.stream(options.stream_index)?.info.rgb_buffer_len();
        if buffer.len() < required {
            return Err(FrameSeekError::BufferTooSmall {
                required,
                actual: buffer.len(),
            });
        }

        let (container, stream) = file.claim_container(options.stream_index)?;
        RetryPolicy::from_options(options).decode(container, stream, frame, buffer)
    }
}

impl<C: MediaContainer> OpenFile<C> {
    fn open<B>(backend: &B, path: &Path) -> Result<Self, FrameSeekError>
    where
        B: MediaBackend<Container = C>,
    {
        let mut container = backend.open(path).map_err(|error| match error {
            BackendError::NoDecodableStream => FrameSeekError::NoVideoStream,
            error => FrameSeekError::OpenFailed {
                path: path.to_path_buf(),
                reason: error.to_string(),
            },
        })?;

        let container_duration = container.duration_micros();
        let descriptors = container.video_streams();
        let mut streams = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            match StreamState::open(&mut container, descriptor, container_duration) {
                Ok(stream) => streams.push(stream),
                Err(error) => {
                    log::warn!("Skipping video stream {}: {error}", descriptor.index);
                }
            }
        }

        if streams.is_empty() {
            return Err(FrameSeekError::NoVideoStream);
        }

        Ok(Self {
            streams,
            container,
            last_stream: None,
        })
    }

    /// Hand the container to `stream_index` for reading.
    ///
    /// All streams share one read cursor, so when a different stream takes
    /// over, every other stream loses its decode position and must seek
    /// before continuing.
    fn claim_container(
        &mut self,
        stream_index: usize,
    ) -> Result<(&mut C, &mut StreamState<C::Decoder>), FrameSeekError> {
        let stream_count = self.streams.len();
        if self.last_stream != Some(stream_index) {
            for (index, stream) in self.streams.iter_mut().enumerate() {
                if index != stream_index {
                    stream.cursor = CursorState::Unpositioned;
                }
            }
            self.last_stream = Some(stream_index);
        }
        let stream = self
            .streams
            .get_mut(stream_index)
            .ok_or(FrameSeekError::StreamOutOfRange {
                stream_index,
                stream_count,
            })?;
        Ok((&mut self.container, stream))
    }

    fn stream(&self, stream_index: usize) -> Result<&StreamState<C::Decoder>, FrameSeekError> {
        self.streams
            .get(stream_index)
            .ok_or(FrameSeekError::StreamOutOfRange {
                stream_index,
                stream_count: self.streams.len(),
            })
    }
}
