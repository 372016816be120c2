//! Per-stream decode state.
//!
//! A [`StreamState`] is built for every decodable video stream when a file
//! is opened. It owns the stream's decoder, its reusable output picture and
//! its conversion context, and tracks where the decoder currently is
//! relative to the stream's frames.

use crate::{
    backend::{
        CompressedPacket, DecodedPicture, MediaContainer, PictureConverter, StreamDescriptor,
        VideoDecoder,
    },
    configuration::RowOrder,
    conversion::{ConversionCache, ScalerKey},
    error::BackendError,
    metadata::{FrameRate, NativePixelFormat, StreamInfo, StreamMetadata},
    retry::NearestFrame,
    timestamp::{FrameClock, TimestampBasis},
};

/// Frame the scan for the last timestamp seeks to; far past any real stream.
const END_SCAN_FRAME: u64 = 1 << 29;

/// Where the decode cursor of a stream stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum CursorState {
    /// Position unknown; the next decode must seek.
    #[default]
    Unpositioned,
    /// A seek was issued and no packet has been fed since.
    Seeking,
    /// Packets are being fed towards a target frame.
    Feeding,
    /// The last requested frame was produced; decoding can continue in order.
    Matched,
    /// The decoder stopped producing output.
    Stalled,
    /// The target frame was skipped or never appeared.
    Missed,
}

pub(crate) struct StreamState<D: VideoDecoder> {
    pub(crate) container_index: usize,
    codec: String,
    pub(crate) decoder: D,
    pub(crate) picture: D::Picture,
    conversion: ConversionCache<D::Converter>,
    pub(crate) info: StreamInfo,
    pub(crate) clock: FrameClock,
    pixel_format: NativePixelFormat,
    pub(crate) codec_delay: u32,
    pub(crate) basis: TimestampBasis,
    /// Next frame to be fed to the decoder; `None` until a packet after a
    /// seek re-establishes position.
    pub(crate) next_frame_in: Option<u64>,
    /// Next frame expected out of the decoder.
    pub(crate) next_frame_out: Option<u64>,
    /// Packets fed without output since the last seek or output.
    pub(crate) stall_counter: u32,
    /// End of input has been signalled to the decoder.
    pub(crate) input_exhausted: bool,
    /// Frame the last seek landed on, once known.
    pub(crate) landing: Option<u64>,
    /// Whether any picture came out since the last seek.
    pub(crate) produced_since_seek: bool,
    pub(crate) cursor: CursorState,
}

impl<D: VideoDecoder> StreamState<D> {
    /// Open the decoder for `descriptor` and derive the stream's timing.
    ///
    /// Probing may move the container's read cursor; every stream starts
    /// [`Unpositioned`](CursorState::Unpositioned) so the first decode seeks.
    pub(crate) fn open<C>(
        container: &mut C,
        descriptor: &StreamDescriptor,
        container_duration: Option<i64>,
    ) -> Result<Self, BackendError>
    where
        C: MediaContainer<Decoder = D>,
    {
        let decoder = container.open_decoder(descriptor.index)?;
        let frame_rate = descriptor
            .frame_rate
            .filter(|rate| rate.is_valid())
            .unwrap_or_default();

        let start_pts = match descriptor.start_time {
            Some(start) => start,
            None => probe_start_pts(container, descriptor.index),
        };
        let clock = FrameClock::new(start_pts, descriptor.time_base, frame_rate);

        let mut frame_count = derive_frame_count(descriptor, container_duration, frame_rate);
        if frame_count == 0 {
            frame_count = scan_frame_count(container, descriptor.index, &clock);
        }

        let pixel_aspect = match descriptor.sample_aspect_ratio {
            Some((numerator, denominator)) if numerator != 0 && denominator != 0 => {
                f64::from(numerator) / f64::from(denominator)
            }
            _ => 1.0,
        };

        let codec_delay = decoder.codec_delay();
        let picture = decoder.new_picture();

        log::debug!(
            "Video stream {}: {}x{}, {}/{} fps, {} frames, start pts {}, codec={}, delay={}",
            descriptor.index,
            descriptor.width,
            descriptor.height,
            frame_rate.numerator,
            frame_rate.denominator,
            frame_count,
            start_pts,
            descriptor.codec,
            codec_delay,
        );

        Ok(Self {
            container_index: descriptor.index,
            codec: descriptor.codec.clone(),
            decoder,
            picture,
            conversion: ConversionCache::default(),
            info: StreamInfo {
                width: descriptor.width,
                height: descriptor.height,
                pixel_aspect,
                frame_count,
            },
            clock,
            pixel_format: descriptor.pixel_format,
            codec_delay,
            basis: TimestampBasis::default(),
            next_frame_in: None,
            next_frame_out: None,
            stall_counter: 0,
            input_exhausted: false,
            landing: None,
            produced_since_seek: false,
            cursor: CursorState::Unpositioned,
        })
    }

    pub(crate) fn frame_rate(&self) -> FrameRate {
        self.clock.frame_rate()
    }

    pub(crate) fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            container_index: self.container_index,
            codec: self.codec.clone(),
            info: self.info,
            frame_rate: self.clock.frame_rate(),
            time_base: self.clock.time_base(),
            start_pts: self.clock.start_pts(),
            codec_delay: self.codec_delay,
            timestamp_basis: self.basis,
            pixel_format: self.pixel_format,
        }
    }

    /// Returns `true` if `frame` is the next picture the decoder will emit
    /// without seeking.
    pub(crate) fn is_positioned_at(&self, frame: u64) -> bool {
        self.cursor == CursorState::Matched && self.next_frame_out == Some(frame)
    }

    /// Forget the decode position after a seek.
    pub(crate) fn reset_cursors(&mut self) {
        self.next_frame_in = None;
        self.next_frame_out = None;
        self.stall_counter = 0;
        self.input_exhausted = false;
        self.landing = None;
        self.produced_since_seek = false;
    }

    /// Record that `frame` was delivered.
    pub(crate) fn mark_matched(&mut self, frame: u64) {
        let next = frame + 1;
        self.next_frame_out = Some(next);
        self.next_frame_in = Some(self.next_frame_in.map_or(next, |input| input.max(next)));
        self.cursor = CursorState::Matched;
    }

    /// Re-read the decoder's delay, which grows when reordering is
    /// discovered mid-stream.
    pub(crate) fn refresh_codec_delay(&mut self) {
        let delay = self.decoder.codec_delay();
        if delay != self.codec_delay {
            log::debug!(
                "Codec delay of stream {} changed from {} to {}",
                self.container_index,
                self.codec_delay,
                delay,
            );
            self.codec_delay = delay;
        }
    }

    /// Frame index of the picture just received.
    ///
    /// Pictures without a usable timestamp take the next expected output
    /// index; `None` when that is unknown too.
    pub(crate) fn picture_frame_index(&mut self) -> Option<i64> {
        let presentation = self.picture.presentation_timestamp();
        let decode = self.picture.decode_timestamp();
        match self.basis.select(presentation, decode) {
            Some(timestamp) => Some(self.clock.pts_to_frame(timestamp)),
            None => self
                .next_frame_out
                .and_then(|frame| i64::try_from(frame).ok()),
        }
    }

    /// Hand the current picture to the nearest-frame tracker.
    pub(crate) fn offer_picture(&mut self, index: i64, nearest: &mut NearestFrame<D::Picture>) {
        let Self {
            decoder, picture, ..
        } = self;
        nearest.offer(index, picture, || decoder.new_picture());
    }

    /// Convert the picture just received into `output`.
    pub(crate) fn convert_current(
        &mut self,
        output: &mut [u8],
        row_order: RowOrder,
    ) -> Result<(), BackendError> {
        let Self {
            decoder,
            picture,
            conversion,
            info,
            ..
        } = self;
        convert_into(decoder, conversion, picture, info, output, row_order)
    }

    /// Convert a picture kept aside (the nearest-frame fallback) into
    /// `output`.
    pub(crate) fn convert_picture(
        &mut self,
        picture: &D::Picture,
        output: &mut [u8],
        row_order: RowOrder,
    ) -> Result<(), BackendError> {
        let Self {
            decoder,
            conversion,
            info,
            ..
        } = self;
        convert_into(decoder, conversion, picture, info, output, row_order)
    }
}

fn convert_into<D: VideoDecoder>(
    decoder: &D,
    conversion: &mut ConversionCache<D::Converter>,
    picture: &D::Picture,
    info: &StreamInfo,
    output: &mut [u8],
    row_order: RowOrder,
) -> Result<(), BackendError> {
    let key = ScalerKey::for_picture(picture, info.width, info.height);
    let converter = conversion.get_or_build(key, || {
        decoder.create_converter(picture, info.width, info.height)
    })?;
    converter.convert(picture, &mut output[..info.rgb_buffer_len()], row_order)
}

/// Find the first presentation timestamp of a stream whose container does
/// not record a start time. Falls back to 0.
fn probe_start_pts<C: MediaContainer>(container: &mut C, stream_index: usize) -> i64 {
    if let Err(error) = container.seek(stream_index, 0) {
        log::warn!("Cannot rewind stream {stream_index} to probe its start time: {error}");
        return 0;
    }
    loop {
        match container.read_packet() {
            Ok(Some(packet)) => {
                if packet.stream_index() != stream_index {
                    continue;
                }
                if let Some(pts) = packet.presentation_timestamp() {
                    return pts;
                }
            }
            Ok(None) => break,
            Err(error) => {
                log::warn!("Read error while probing start of stream {stream_index}: {error}");
                break;
            }
        }
    }
    log::warn!("Stream {stream_index} carries no presentation timestamps, assuming start at 0");
    0
}

/// Frame count from the metadata a container reports, or 0 when none of
/// it is usable.
///
/// The container duration wins because edit lists can remap a track's
/// media; it is stored rounded to microseconds, so one microsecond is taken
/// off before rounding up and a declared frame count within one frame
/// replaces the estimate.
pub(crate) fn derive_frame_count(
    descriptor: &StreamDescriptor,
    container_duration: Option<i64>,
    frame_rate: FrameRate,
) -> u64 {
    let declared = descriptor.declared_frames.filter(|&frames| frames > 0);
    let mut frames = 0;

    if let Some(duration) = container_duration.filter(|&duration| duration > 0) {
        if frame_rate.is_valid() {
            let divisor = 1_000_000_i128 * i128::from(frame_rate.denominator);
            let estimate =
                ((i128::from(duration) - 1) * i128::from(frame_rate.numerator) + divisor - 1)
                    / divisor;
            frames = u64::try_from(estimate).unwrap_or(0);
            if let Some(declared) = declared {
                if frames.abs_diff(declared) <= 1 {
                    frames = declared;
                }
            }
        }
    }

    if frames == 0 {
        frames = declared.unwrap_or(0);
    }

    if frames == 0 {
        if let Some(duration) = descriptor.duration.filter(|&duration| duration > 0) {
            let time_base = descriptor.time_base;
            let numerator = i128::from(duration)
                * i128::from(time_base.numerator)
                * i128::from(frame_rate.numerator);
            let denominator =
                i128::from(time_base.denominator) * i128::from(frame_rate.denominator);
            if denominator > 0 {
                frames = u64::try_from(numerator / denominator).unwrap_or(0);
            }
        }
    }

    frames
}

/// Measure the frame count by reading the tail of the stream for its
/// largest presentation timestamp.
fn scan_frame_count<C: MediaContainer>(
    container: &mut C,
    stream_index: usize,
    clock: &FrameClock,
) -> u64 {
    log::debug!("Frame count of stream {stream_index} unknown, scanning for the last timestamp");
    let mut max_pts = clock.start_pts();
    if let Err(error) = container.seek(stream_index, clock.frame_to_pts(END_SCAN_FRAME)) {
        log::warn!("Cannot seek to the end of stream {stream_index}: {error}");
    }
    loop {
        match container.read_packet() {
            Ok(Some(packet)) => {
                if packet.stream_index() != stream_index {
                    continue;
                }
                if let Some(pts) = packet.presentation_timestamp() {
                    max_pts = max_pts.max(pts);
                }
            }
            Ok(None) => break,
            Err(error) => {
                log::warn!("Read error while scanning stream {stream_index}: {error}");
                break;
            }
        }
    }
    u64::try_from(clock.pts_to_frame(max_pts) + 1).unwrap_or(0)
}
