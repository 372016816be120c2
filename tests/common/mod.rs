//! Scripted in-memory backend shared by the integration tests.
//!
//! `StubBackend` serves a synthetic container whose packets, decoder delay,
//! keyframe spacing and failure modes come from a `StubScript`. Every
//! contract call is appended to an event log tagged with the calling thread
//! and a per-thread call id, so tests can count seeks or check that calls
//! never interleave.

#![allow(dead_code)]

use std::{
    cell::Cell,
    collections::VecDeque,
    path::Path,
    sync::Arc,
    thread::{self, ThreadId},
};

use frameseek::{
    BackendError, CompressedPacket, DecodedPicture, FrameRate, MediaBackend, MediaContainer,
    MediaFile, NativePixelFormat, PictureConverter, RowOrder, StreamDescriptor, TimeBase,
    VideoDecoder, copy_packed_rows,
};
use parking_lot::Mutex;

/// Timestamp ticks per frame: 1/90000 time base at 25 fps.
pub const TICKS_PER_FRAME: i64 = 3_600;

/// Third byte of every pixel the stub converter writes.
pub const PIXEL_TAG: u8 = 0xAB;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Every fed packet eventually becomes a picture.
    Normal,
    /// The decoder swallows everything.
    AlwaysStall,
    /// Pictures for these frames are never emitted.
    Missing(Vec<u64>),
    /// Every picture carries this frame's content and timestamps.
    OnlyFrame(u64),
}

#[derive(Debug, Clone)]
pub struct StubScript {
    /// Frames actually present in the stream.
    pub frame_count: u64,
    pub declared_frames: Option<u64>,
    pub container_duration: Option<i64>,
    pub stream_duration: Option<i64>,
    pub start_pts: i64,
    /// Whether the descriptor reports `start_pts` as the start time.
    pub declare_start: bool,
    pub width: u32,
    pub height: u32,
    /// From this frame on, pictures have a different source size.
    pub resize_from: Option<(u64, u32, u32)>,
    pub codec_delay: u32,
    pub gop: u64,
    pub behavior: Behavior,
    pub packets_carry_pts: bool,
    /// Whether decoded pictures keep their packet's timestamps.
    pub pictures_carry_timestamps: bool,
    pub seek_fails: bool,
    /// The first seek on a container lands one keyframe late.
    pub overshoot_first_seek: bool,
    pub interleave_audio: bool,
    /// Reading the video packet of this frame fails.
    pub read_error_at: Option<u64>,
    pub video_streams: usize,
}

impl Default for StubScript {
    fn default() -> Self {
        Self {
            frame_count: 100,
            declared_frames: Some(100),
            container_duration: None,
            stream_duration: None,
            start_pts: 0,
            declare_start: true,
            width: 8,
            height: 4,
            resize_from: None,
            codec_delay: 0,
            gop: 10,
            behavior: Behavior::Normal,
            packets_carry_pts: true,
            pictures_carry_timestamps: true,
            seek_fails: false,
            overshoot_first_seek: false,
            interleave_audio: false,
            read_error_at: None,
            video_streams: 1,
        }
    }
}

impl StubScript {
    pub fn with_frames(frame_count: u64) -> Self {
        Self {
            frame_count,
            declared_frames: Some(frame_count),
            ..Self::default()
        }
    }

    fn picture_size(&self, frame: u64) -> (u32, u32) {
        match self.resize_from {
            Some((from, width, height)) if frame >= from => (width, height),
            _ => (self.width, self.height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Open,
    Seek { timestamp: i64 },
    ReadPacket,
    SendPacket { stream: usize, frame: u64 },
    SendEof,
    ReceivePicture { frame: u64 },
    Flush,
    CreateConverter { id: u64 },
    Convert { converter_id: u64, frame: u64 },
}

#[derive(Debug, Clone)]
pub struct Event {
    pub call: u64,
    pub thread: ThreadId,
    pub kind: EventKind,
}

thread_local! {
    static CALL_ID: Cell<u64> = const { Cell::new(0) };
}

/// Tag every event recorded on this thread with `id` until changed.
pub fn set_call_id(id: u64) {
    CALL_ID.with(|call| call.set(id));
}

#[derive(Debug, Default)]
struct Shared {
    events: Vec<Event>,
    next_converter: u64,
}

type SharedLog = Arc<Mutex<Shared>>;

fn record(shared: &SharedLog, kind: EventKind) {
    let call = CALL_ID.with(Cell::get);
    shared.lock().events.push(Event {
        call,
        thread: thread::current().id(),
        kind,
    });
}

#[derive(Debug, Clone)]
pub struct StubBackend {
    script: Arc<Mutex<StubScript>>,
    shared: SharedLog,
}

impl StubBackend {
    pub fn new(script: StubScript) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            shared: Arc::default(),
        }
    }

    /// Change the script used by later opens.
    pub fn update(&self, change: impl FnOnce(&mut StubScript)) {
        change(&mut self.script.lock());
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.shared.lock().events.clear();
    }

    pub fn count(&self, matches: impl Fn(&EventKind) -> bool) -> usize {
        self.shared
            .lock()
            .events
            .iter()
            .filter(|event| matches(&event.kind))
            .count()
    }

    pub fn seeks(&self) -> usize {
        self.count(|kind| matches!(kind, EventKind::Seek { .. }))
    }
}

impl MediaBackend for StubBackend {
    type Container = StubContainer;

    fn open(&self, path: &Path) -> Result<StubContainer, BackendError> {
        record(&self.shared, EventKind::Open);
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if name.starts_with("missing") {
            return Err(BackendError::NotFound(path.to_path_buf()));
        }
        if name.ends_with(".txt") {
            return Err(BackendError::UnsupportedFormat("text".to_string()));
        }

        let script = self.script.lock().clone();
        if script.video_streams == 0 {
            return Err(BackendError::NoDecodableStream);
        }
        Ok(StubContainer::new(script, Arc::clone(&self.shared)))
    }
}

#[derive(Debug, Clone)]
pub struct StubPacket {
    stream: usize,
    frame: u64,
    pts: Option<i64>,
    dts: Option<i64>,
}

impl CompressedPacket for StubPacket {
    fn stream_index(&self) -> usize {
        self.stream
    }

    fn presentation_timestamp(&self) -> Option<i64> {
        self.pts
    }

    fn decode_timestamp(&self) -> Option<i64> {
        self.dts
    }
}

pub struct StubContainer {
    script: StubScript,
    shared: SharedLog,
    packets: Vec<StubPacket>,
    packets_per_frame: usize,
    position: usize,
    seeks_done: u64,
}

impl StubContainer {
    fn new(script: StubScript, shared: SharedLog) -> Self {
        let audio_stream = script.video_streams;
        let mut packets = Vec::new();
        for frame in 0..script.frame_count {
            let timestamp = script.start_pts + frame as i64 * TICKS_PER_FRAME;
            for stream in 0..script.video_streams {
                packets.push(StubPacket {
                    stream,
                    frame,
                    pts: script.packets_carry_pts.then_some(timestamp),
                    dts: Some(timestamp),
                });
            }
            if script.interleave_audio {
                packets.push(StubPacket {
                    stream: audio_stream,
                    frame,
                    pts: Some(timestamp),
                    dts: Some(timestamp),
                });
            }
        }
        let packets_per_frame = script.video_streams + usize::from(script.interleave_audio);
        Self {
            script,
            shared,
            packets,
            packets_per_frame,
            position: 0,
            seeks_done: 0,
        }
    }
}

impl MediaContainer for StubContainer {
    type Packet = StubPacket;
    type Decoder = StubDecoder;

    fn duration_micros(&self) -> Option<i64> {
        self.script.container_duration
    }

    fn video_streams(&self) -> Vec<StreamDescriptor> {
        (0..self.script.video_streams)
            .map(|index| StreamDescriptor {
                index,
                width: self.script.width,
                height: self.script.height,
                frame_rate: Some(FrameRate::new(25, 1)),
                time_base: TimeBase::new(1, 90_000),
                pixel_format: NativePixelFormat(0),
                codec: "stub".to_string(),
                sample_aspect_ratio: Some((4, 3)),
                start_time: self.script.declare_start.then_some(self.script.start_pts),
                declared_frames: self.script.declared_frames,
                duration: self.script.stream_duration,
            })
            .collect()
    }

    fn open_decoder(&mut self, _stream_index: usize) -> Result<StubDecoder, BackendError> {
        Ok(StubDecoder {
            script: self.script.clone(),
            shared: Arc::clone(&self.shared),
            queue: VecDeque::new(),
            draining: false,
        })
    }

    fn seek(&mut self, _stream_index: usize, timestamp: i64) -> Result<(), BackendError> {
        record(&self.shared, EventKind::Seek { timestamp });
        if self.script.seek_fails {
            return Err(BackendError::native(-1, "stub seek refused"));
        }
        let last = self.script.frame_count.saturating_sub(1);
        let frame = if timestamp <= self.script.start_pts {
            0
        } else {
            (((timestamp - self.script.start_pts) / TICKS_PER_FRAME) as u64).min(last)
        };
        let gop = self.script.gop.max(1);
        let mut keyframe = frame - frame % gop;
        if self.script.overshoot_first_seek && self.seeks_done == 0 && keyframe + gop <= last {
            keyframe += gop;
        }
        self.seeks_done += 1;
        self.position = keyframe as usize * self.packets_per_frame;
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<StubPacket>, BackendError> {
        record(&self.shared, EventKind::ReadPacket);
        let Some(packet) = self.packets.get(self.position).cloned() else {
            return Ok(None);
        };
        if packet.stream == 0 && self.script.read_error_at == Some(packet.frame) {
            return Err(BackendError::native(-5, "stub read error"));
        }
        self.position += 1;
        Ok(Some(packet))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubPicture {
    pub frame: u64,
    pub width: u32,
    pub height: u32,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
}

impl DecodedPicture for StubPicture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixel_format(&self) -> NativePixelFormat {
        NativePixelFormat(0)
    }

    fn presentation_timestamp(&self) -> Option<i64> {
        self.pts
    }

    fn decode_timestamp(&self) -> Option<i64> {
        self.dts
    }
}

pub struct StubDecoder {
    script: StubScript,
    shared: SharedLog,
    queue: VecDeque<StubPacket>,
    draining: bool,
}

impl VideoDecoder for StubDecoder {
    type Packet = StubPacket;
    type Picture = StubPicture;
    type Converter = StubConverter;

    fn codec_delay(&self) -> u32 {
        self.script.codec_delay
    }

    fn new_picture(&self) -> StubPicture {
        StubPicture::default()
    }

    fn send_packet(&mut self, packet: &StubPacket) -> Result<(), BackendError> {
        record(
            &self.shared,
            EventKind::SendPacket {
                stream: packet.stream,
                frame: packet.frame,
            },
        );
        self.queue.push_back(packet.clone());
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        record(&self.shared, EventKind::SendEof);
        self.draining = true;
        Ok(())
    }

    fn receive_picture(&mut self, picture: &mut StubPicture) -> Result<bool, BackendError> {
        if self.script.behavior == Behavior::AlwaysStall {
            return Ok(false);
        }
        loop {
            let ready = self.queue.len() > self.script.codec_delay as usize
                || (self.draining && !self.queue.is_empty());
            if !ready {
                return Ok(false);
            }
            let Some(packet) = self.queue.pop_front() else {
                return Ok(false);
            };
            if let Behavior::Missing(frames) = &self.script.behavior {
                if frames.contains(&packet.frame) {
                    continue;
                }
            }
            let frame = match self.script.behavior {
                Behavior::OnlyFrame(frame) => frame,
                _ => packet.frame,
            };
            let timestamp = |original: Option<i64>| {
                let shifted = original.map(|value| {
                    value + (frame as i64 - packet.frame as i64) * TICKS_PER_FRAME
                });
                shifted.filter(|_| self.script.pictures_carry_timestamps)
            };
            let (width, height) = self.script.picture_size(frame);
            *picture = StubPicture {
                frame,
                width,
                height,
                pts: timestamp(packet.pts),
                dts: timestamp(packet.dts),
            };
            record(&self.shared, EventKind::ReceivePicture { frame });
            return Ok(true);
        }
    }

    fn flush(&mut self) {
        record(&self.shared, EventKind::Flush);
        self.queue.clear();
        self.draining = false;
    }

    fn create_converter(
        &self,
        _picture: &StubPicture,
        target_width: u32,
        target_height: u32,
    ) -> Result<StubConverter, BackendError> {
        let id = {
            let mut shared = self.shared.lock();
            shared.next_converter += 1;
            shared.next_converter
        };
        record(&self.shared, EventKind::CreateConverter { id });
        Ok(StubConverter {
            id,
            shared: Arc::clone(&self.shared),
            width: target_width,
            height: target_height,
        })
    }
}

/// Writes `[frame, row, PIXEL_TAG]` into every pixel of a padded plane,
/// then packs it into the output.
pub struct StubConverter {
    id: u64,
    shared: SharedLog,
    width: u32,
    height: u32,
}

impl PictureConverter for StubConverter {
    type Picture = StubPicture;

    fn convert(
        &mut self,
        picture: &StubPicture,
        output: &mut [u8],
        row_order: RowOrder,
    ) -> Result<(), BackendError> {
        record(
            &self.shared,
            EventKind::Convert {
                converter_id: self.id,
                frame: picture.frame,
            },
        );
        let row_bytes = self.width as usize * 3;
        let stride = row_bytes + 5;
        let mut plane = vec![0u8; stride * self.height as usize];
        for row in 0..self.height as usize {
            for pixel in plane[row * stride..row * stride + row_bytes].chunks_exact_mut(3) {
                pixel.copy_from_slice(&[picture.frame as u8, row as u8, PIXEL_TAG]);
            }
        }
        copy_packed_rows(
            &plane,
            stride,
            output,
            row_bytes,
            self.height as usize,
            row_order,
        );
        Ok(())
    }
}

/// A stub-backed file opened on a script.
pub fn open_stub(script: StubScript) -> (StubBackend, MediaFile<StubBackend>) {
    let backend = StubBackend::new(script);
    let file = MediaFile::with_backend(backend.clone());
    file.open("clip.mov").expect("open stub file");
    (backend, file)
}

/// A buffer sized for one RGB picture of stream 0.
pub fn frame_buffer(file: &MediaFile<StubBackend>) -> Vec<u8> {
    vec![0u8; file.info(0).expect("info").rgb_buffer_len()]
}

/// Frame number the stub converter stamped into the first pixel.
pub fn stamped_frame(buffer: &[u8]) -> u8 {
    buffer[0]
}

/// Row tag of the first pixel of output row `row`.
pub fn stamped_row(buffer: &[u8], width: u32, row: usize) -> u8 {
    buffer[row * width as usize * 3 + 1]
}
