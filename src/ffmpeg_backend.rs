//! The FFmpeg decoding backend.
//!
//! Implements the [`backend`](crate::backend) contract on top of
//! `ffmpeg-next`. Seeking goes through `av_seek_frame` with
//! `AVSEEK_FLAG_BACKWARD` so the demuxer always lands on a keyframe at or
//! before the requested timestamp; the engine decodes forward from there.

use std::path::Path;

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as NativeVideoDecoder,
    format::{Pixel, context::Input, stream::Stream},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::error::EAGAIN,
};
use ffmpeg_sys_next::{AV_CODEC_CAP_DELAY, AV_NOPTS_VALUE, AVPixelFormat, AVSEEK_FLAG_BACKWARD};

use crate::{
    backend::{
        CompressedPacket, DecodedPicture, MediaBackend, MediaContainer, PictureConverter,
        StreamDescriptor, VideoDecoder,
    },
    configuration::RowOrder,
    conversion::{RGB_BYTES_PER_PIXEL, copy_packed_rows},
    error::{BackendError, FrameSeekError},
    metadata::{FrameRate, NativePixelFormat, TimeBase},
};

/// Opens containers with FFmpeg.
///
/// # Example
///
/// ```no_run
/// use frameseek::{FfmpegBackend, MediaFile};
///
/// let file = MediaFile::with_backend(FfmpegBackend::new()?);
/// file.open("input.mkv")?;
/// # Ok::<(), frameseek::FrameSeekError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend {
    _initialized: (),
}

impl FfmpegBackend {
    /// Create the backend, initializing FFmpeg if that has not happened yet.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::NativeDecodeError`] if FFmpeg fails to
    /// initialize.
    pub fn new() -> Result<Self, FrameSeekError> {
        crate::ffmpeg::initialize()?;
        Ok(Self { _initialized: () })
    }
}

impl MediaBackend for FfmpegBackend {
    type Container = FfmpegContainer;

    fn open(&self, path: &Path) -> Result<FfmpegContainer, BackendError> {
        if !path.exists() {
            return Err(BackendError::NotFound(path.to_path_buf()));
        }

        let input = ffmpeg_next::format::input(&path)
            .map_err(|error| BackendError::UnsupportedFormat(error.to_string()))?;

        let has_video = input
            .streams()
            .any(|stream| stream.parameters().medium() == Type::Video);
        if !has_video {
            return Err(BackendError::NoDecodableStream);
        }

        Ok(FfmpegContainer { input })
    }
}

/// An FFmpeg demuxer context.
pub struct FfmpegContainer {
    input: Input,
}

// SAFETY: the demuxer context is owned exclusively by this value and is
// only touched through `&mut self` while the owning `MediaFile` holds its
// lock, so moving it to another thread cannot race.
unsafe impl Send for FfmpegContainer {}

impl MediaContainer for FfmpegContainer {
    type Packet = Packet;
    type Decoder = FfmpegDecoder;

    fn duration_micros(&self) -> Option<i64> {
        let duration = self.input.duration();
        (duration > 0).then_some(duration)
    }

    fn video_streams(&self) -> Vec<StreamDescriptor> {
        self.input
            .streams()
            .filter(|stream| stream.parameters().medium() == Type::Video)
            .filter_map(|stream| describe_stream(&stream))
            .collect()
    }

    fn open_decoder(&mut self, stream_index: usize) -> Result<FfmpegDecoder, BackendError> {
        let stream = self
            .input
            .stream(stream_index)
            .ok_or(BackendError::NoDecodableStream)?;
        let context = CodecContext::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;
        Ok(FfmpegDecoder { decoder })
    }

    fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<(), BackendError> {
        let stream_index = i32::try_from(stream_index)
            .map_err(|_| BackendError::native(-1, format!("stream index {stream_index} overflows")))?;
        // SAFETY: the context pointer is valid for the life of `self.input`
        // and nothing else holds it during this call.
        let result = unsafe {
            ffmpeg_sys_next::av_seek_frame(
                self.input.as_mut_ptr(),
                stream_index,
                timestamp,
                AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        if result < 0 {
            return Err(FfmpegError::from(result).into());
        }
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, BackendError> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(packet)),
            Err(FfmpegError::Eof) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

fn describe_stream(stream: &Stream<'_>) -> Option<StreamDescriptor> {
    let index = stream.index();
    let decoder = match CodecContext::from_parameters(stream.parameters())
        .and_then(|context| context.decoder().video())
    {
        Ok(decoder) => decoder,
        Err(error) => {
            log::warn!("Cannot read video parameters of stream {index}: {error}");
            return None;
        }
    };

    let frame_rate = [stream.rate(), stream.avg_frame_rate()]
        .into_iter()
        .find(|rate| rate.numerator() != 0 && rate.denominator() != 0)
        .map(|rate| FrameRate::new(rate.numerator(), rate.denominator()));

    let time_base = stream.time_base();
    let pixel_format: AVPixelFormat = decoder.format().into();

    // SAFETY: `stream` borrows the open input, so the AVStream is alive.
    let stream_aspect = unsafe { (*stream.as_ptr()).sample_aspect_ratio };
    let sample_aspect_ratio = if stream_aspect.num != 0 && stream_aspect.den != 0 {
        Some((stream_aspect.num, stream_aspect.den))
    } else {
        let codec_aspect = decoder.aspect_ratio();
        (codec_aspect.numerator() != 0 && codec_aspect.denominator() != 0)
            .then(|| (codec_aspect.numerator(), codec_aspect.denominator()))
    };

    let start_time = stream.start_time();
    let codec = decoder
        .codec()
        .map(|codec| codec.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    Some(StreamDescriptor {
        index,
        width: decoder.width(),
        height: decoder.height(),
        frame_rate,
        time_base: TimeBase::new(time_base.numerator(), time_base.denominator()),
        pixel_format: NativePixelFormat(pixel_format as i32),
        codec,
        sample_aspect_ratio,
        start_time: (start_time != AV_NOPTS_VALUE).then_some(start_time),
        declared_frames: u64::try_from(stream.frames()).ok().filter(|&frames| frames > 0),
        duration: Some(stream.duration()).filter(|&duration| duration > 0),
    })
}

/// An opened FFmpeg video decoder.
pub struct FfmpegDecoder {
    decoder: NativeVideoDecoder,
}

// SAFETY: the codec context is owned exclusively by this value and only
// used behind the `MediaFile` lock.
unsafe impl Send for FfmpegDecoder {}

impl VideoDecoder for FfmpegDecoder {
    type Packet = Packet;
    type Picture = VideoFrame;
    type Converter = FfmpegConverter;

    fn codec_delay(&self) -> u32 {
        // SAFETY: the codec context and the codec it points to live as long
        // as `self.decoder`.
        let delay = unsafe {
            let context = self.decoder.as_ptr();
            let codec = (*context).codec;
            let buffers_input =
                !codec.is_null() && ((*codec).capabilities & AV_CODEC_CAP_DELAY as i32) != 0;
            let frame_delay = if buffers_input { (*context).delay.max(0) } else { 0 };
            frame_delay + (*context).has_b_frames.max(0)
        };
        u32::try_from(delay).unwrap_or(0)
    }

    fn new_picture(&self) -> VideoFrame {
        VideoFrame::empty()
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<(), BackendError> {
        self.decoder.send_packet(packet)?;
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        match self.decoder.send_eof() {
            Ok(()) | Err(FfmpegError::Eof) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn receive_picture(&mut self, picture: &mut VideoFrame) -> Result<bool, BackendError> {
        match self.decoder.receive_frame(picture) {
            Ok(()) => Ok(true),
            Err(FfmpegError::Eof) => Ok(false),
            Err(FfmpegError::Other { errno }) if errno == EAGAIN => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn create_converter(
        &self,
        picture: &VideoFrame,
        target_width: u32,
        target_height: u32,
    ) -> Result<FfmpegConverter, BackendError> {
        let scaler = ScalingContext::get(
            picture.format(),
            picture.width(),
            picture.height(),
            Pixel::RGB24,
            target_width,
            target_height,
            ScalingFlags::BICUBIC,
        )?;
        Ok(FfmpegConverter {
            scaler,
            scaled: VideoFrame::empty(),
            width: target_width,
            height: target_height,
        })
    }
}

/// A cached `swscale` context converting to packed RGB24.
pub struct FfmpegConverter {
    scaler: ScalingContext,
    scaled: VideoFrame,
    width: u32,
    height: u32,
}

// SAFETY: the scaling context and scratch frame are owned exclusively by
// this value and only used behind the `MediaFile` lock.
unsafe impl Send for FfmpegConverter {}

impl PictureConverter for FfmpegConverter {
    type Picture = VideoFrame;

    fn convert(
        &mut self,
        picture: &VideoFrame,
        output: &mut [u8],
        row_order: RowOrder,
    ) -> Result<(), BackendError> {
        self.scaler.run(picture, &mut self.scaled)?;
        copy_packed_rows(
            self.scaled.data(0),
            self.scaled.stride(0),
            output,
            self.width as usize * RGB_BYTES_PER_PIXEL,
            self.height as usize,
            row_order,
        );
        Ok(())
    }
}

impl CompressedPacket for Packet {
    fn stream_index(&self) -> usize {
        self.stream()
    }

    fn presentation_timestamp(&self) -> Option<i64> {
        self.pts()
    }

    fn decode_timestamp(&self) -> Option<i64> {
        self.dts()
    }
}

impl DecodedPicture for VideoFrame {
    fn width(&self) -> u32 {
        VideoFrame::width(self)
    }

    fn height(&self) -> u32 {
        VideoFrame::height(self)
    }

    fn pixel_format(&self) -> NativePixelFormat {
        let format: AVPixelFormat = self.format().into();
        NativePixelFormat(format as i32)
    }

    fn presentation_timestamp(&self) -> Option<i64> {
        self.pts().or_else(|| self.timestamp())
    }

    fn decode_timestamp(&self) -> Option<i64> {
        // SAFETY: the AVFrame is alive for the duration of the borrow.
        let dts = unsafe { (*self.as_ptr()).pkt_dts };
        (dts != AV_NOPTS_VALUE).then_some(dts)
    }
}
