//! The decoding contract the engine drives.
//!
//! The engine never talks to a codec library directly. It opens containers
//! through a [`MediaBackend`], reads interleaved packets from a
//! [`MediaContainer`], feeds them to one [`VideoDecoder`] per selected
//! stream and turns decoded pictures into packed RGB through a
//! [`PictureConverter`]. The FFmpeg implementation lives in
//! [`ffmpeg_backend`](crate::ffmpeg_backend); tests drive the engine with
//! scripted in-memory implementations.

use std::path::Path;

use crate::{
    configuration::RowOrder,
    error::BackendError,
    metadata::{FrameRate, NativePixelFormat, TimeBase},
};

/// Everything a container reports about one video stream at open time.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Index of the stream inside the container.
    pub index: usize,
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Declared frame rate, if any.
    pub frame_rate: Option<FrameRate>,
    /// Time base of packet and picture timestamps.
    pub time_base: TimeBase,
    /// Native pixel layout of decoded pictures.
    pub pixel_format: NativePixelFormat,
    /// Codec name.
    pub codec: String,
    /// Sample aspect ratio declared by the stream, then by the codec.
    pub sample_aspect_ratio: Option<(i32, i32)>,
    /// Timestamp of the first frame, when the container records it.
    pub start_time: Option<i64>,
    /// Frame count declared by the container, when known.
    pub declared_frames: Option<u64>,
    /// Stream duration in time-base units, when known.
    pub duration: Option<i64>,
}

/// A compressed packet read from a container.
pub trait CompressedPacket {
    /// Container stream the packet belongs to.
    fn stream_index(&self) -> usize;
    /// Presentation timestamp, if populated.
    fn presentation_timestamp(&self) -> Option<i64>;
    /// Decode timestamp, if populated.
    fn decode_timestamp(&self) -> Option<i64>;
}

/// A decoded picture in the backend's native layout.
pub trait DecodedPicture {
    /// Picture width in pixels.
    fn width(&self) -> u32;
    /// Picture height in pixels.
    fn height(&self) -> u32;
    /// Native pixel layout.
    fn pixel_format(&self) -> NativePixelFormat;
    /// Presentation timestamp, if the decoder produced one.
    fn presentation_timestamp(&self) -> Option<i64>;
    /// Decode timestamp of the packet the picture came from, if known.
    fn decode_timestamp(&self) -> Option<i64>;
}

/// Opens containers.
pub trait MediaBackend: Send + Sync {
    /// Container handle produced by [`open`](MediaBackend::open).
    type Container: MediaContainer;

    /// Open and probe the file at `path`.
    fn open(&self, path: &Path) -> Result<Self::Container, BackendError>;
}

/// An opened container with interleaved streams.
pub trait MediaContainer: Send {
    /// Packet type read from this container.
    type Packet: CompressedPacket;
    /// Decoder type consuming this container's packets.
    type Decoder: VideoDecoder<Packet = Self::Packet>;

    /// Container duration in microseconds, when known.
    fn duration_micros(&self) -> Option<i64>;

    /// Describe every video stream in the container.
    fn video_streams(&self) -> Vec<StreamDescriptor>;

    /// Open a decoder for the stream at container index `stream_index`.
    fn open_decoder(&mut self, stream_index: usize) -> Result<Self::Decoder, BackendError>;

    /// Move the read cursor to the last keyframe at or before `timestamp`
    /// (in the stream's time base).
    fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<(), BackendError>;

    /// Read the next packet of any stream, or `None` at end of input.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>, BackendError>;
}

/// A feed/drain video decoder.
pub trait VideoDecoder: Send {
    /// Packet type accepted by [`send_packet`](VideoDecoder::send_packet).
    type Packet;
    /// Picture type produced by [`receive_picture`](VideoDecoder::receive_picture).
    type Picture: DecodedPicture + Send;
    /// Converter type turning pictures into packed RGB.
    type Converter: PictureConverter<Picture = Self::Picture>;

    /// Input packets the decoder needs before it emits its first picture.
    ///
    /// May grow while decoding as the codec discovers reordering.
    fn codec_delay(&self) -> u32;

    /// Allocate an empty picture to receive into.
    fn new_picture(&self) -> Self::Picture;

    /// Feed one compressed packet.
    fn send_packet(&mut self, packet: &Self::Packet) -> Result<(), BackendError>;

    /// Signal end of input so buffered pictures can be drained.
    fn send_eof(&mut self) -> Result<(), BackendError>;

    /// Receive the next decoded picture into `picture`.
    ///
    /// Returns `Ok(false)` when the decoder needs more input or is drained.
    fn receive_picture(&mut self, picture: &mut Self::Picture) -> Result<bool, BackendError>;

    /// Drop every buffered packet and picture.
    fn flush(&mut self);

    /// Build a converter from `picture`'s geometry and layout to packed RGB
    /// of `target_width` × `target_height`.
    fn create_converter(
        &self,
        picture: &Self::Picture,
        target_width: u32,
        target_height: u32,
    ) -> Result<Self::Converter, BackendError>;
}

/// Converts native pictures into packed 8-bit RGB.
pub trait PictureConverter: Send {
    /// Picture type this converter reads.
    type Picture;

    /// Write `picture` as packed RGB24 rows into `output`.
    ///
    /// `output` holds exactly `target_width * target_height * 3` bytes.
    fn convert(
        &mut self,
        picture: &Self::Picture,
        output: &mut [u8],
        row_order: RowOrder,
    ) -> Result<(), BackendError>;
}
