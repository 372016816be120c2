//! Timestamp basis, start offsets and frame-count derivation.

mod common;

use common::{EventKind, StubScript, TICKS_PER_FRAME, frame_buffer, open_stub, stamped_frame};
use frameseek::{FrameRate, TimeBase, TimestampBasis};

#[test]
fn presentation_timestamps_fix_the_basis() {
    let (_backend, file) = open_stub(StubScript::with_frames(30));
    assert_eq!(
        file.stream_metadata(0).expect("metadata").timestamp_basis,
        TimestampBasis::Undecided
    );

    let mut buffer = frame_buffer(&file);
    file.decode(&mut buffer, 12, false, 10, 0).expect("decode");

    assert_eq!(
        file.stream_metadata(0).expect("metadata").timestamp_basis,
        TimestampBasis::Presentation
    );
}

#[test]
fn decode_timestamps_are_used_when_presentation_is_absent() {
    let (backend, file) = open_stub(StubScript {
        packets_carry_pts: false,
        ..StubScript::with_frames(30)
    });
    backend.clear_events();

    let mut buffer = frame_buffer(&file);
    for frame in [12, 13, 14, 3] {
        let delivered = file.decode(&mut buffer, frame, false, 10, 0).expect("decode");
        assert_eq!(delivered, frame);
        assert_eq!(stamped_frame(&buffer), frame as u8);
    }

    let metadata = file.stream_metadata(0).expect("metadata");
    assert_eq!(metadata.timestamp_basis, TimestampBasis::Decode);
    assert_eq!(backend.seeks(), 2);
}

#[test]
fn declared_start_offsets_seek_targets() {
    let start = 900_000;
    let (backend, file) = open_stub(StubScript {
        start_pts: start,
        ..StubScript::with_frames(30)
    });
    backend.clear_events();

    let mut buffer = frame_buffer(&file);
    file.decode(&mut buffer, 7, false, 10, 0).expect("decode");

    assert_eq!(stamped_frame(&buffer), 7);
    assert_eq!(file.stream_metadata(0).expect("metadata").start_pts, start);
    let seeks: Vec<_> = backend
        .events()
        .into_iter()
        .filter_map(|event| match event.kind {
            EventKind::Seek { timestamp } => Some(timestamp),
            _ => None,
        })
        .collect();
    assert_eq!(seeks, vec![start + 7 * TICKS_PER_FRAME]);
}

#[test]
fn undeclared_start_is_probed_from_packets() {
    let (_backend, file) = open_stub(StubScript {
        start_pts: 7_200,
        declare_start: false,
        ..StubScript::with_frames(30)
    });

    assert_eq!(file.stream_metadata(0).expect("metadata").start_pts, 7_200);

    let mut buffer = frame_buffer(&file);
    file.decode(&mut buffer, 3, false, 10, 0).expect("decode");
    assert_eq!(stamped_frame(&buffer), 3);
}

#[test]
fn frame_count_from_container_duration() {
    let (_backend, file) = open_stub(StubScript {
        declared_frames: None,
        // Four seconds at 25 fps.
        container_duration: Some(4_000_000),
        ..StubScript::with_frames(100)
    });

    assert_eq!(file.info(0).expect("info").frame_count, 100);
}

#[test]
fn frame_count_from_stream_duration() {
    let (_backend, file) = open_stub(StubScript {
        declared_frames: None,
        stream_duration: Some(100 * TICKS_PER_FRAME),
        ..StubScript::with_frames(100)
    });

    assert_eq!(file.info(0).expect("info").frame_count, 100);
}

#[test]
fn frame_count_scanned_when_metadata_is_missing() {
    let (backend, file) = open_stub(StubScript {
        declared_frames: None,
        ..StubScript::with_frames(95)
    });

    assert_eq!(file.info(0).expect("info").frame_count, 95);
    assert!(backend.seeks() >= 1);

    let mut buffer = frame_buffer(&file);
    let delivered = file.decode(&mut buffer, 94, false, 10, 0).expect("decode last");
    assert_eq!(delivered, 94);
}

#[test]
fn stream_metadata_reports_rates_and_aspect() {
    let (_backend, file) = open_stub(StubScript::with_frames(10));

    let metadata = file.stream_metadata(0).expect("metadata");
    assert_eq!(metadata.frame_rate, FrameRate::new(25, 1));
    assert_eq!(metadata.time_base, TimeBase::new(1, 90_000));
    assert_eq!(metadata.codec, "stub");
    assert_eq!(file.frame_rate(0).expect("frame rate"), FrameRate::new(25, 1));

    let info = file.info(0).expect("info");
    assert_eq!((info.width, info.height), (8, 4));
    assert!((info.pixel_aspect - 4.0 / 3.0).abs() < 1e-9);
    assert_eq!(info.rgb_buffer_len(), 8 * 4 * 3);
}

#[test]
fn untimestamped_pictures_count_from_the_landing_frame() {
    let (backend, file) = open_stub(StubScript {
        codec_delay: 2,
        pictures_carry_timestamps: false,
        ..StubScript::with_frames(40)
    });
    backend.clear_events();

    let mut buffer = frame_buffer(&file);
    for frame in [13, 14, 15, 31] {
        let delivered = file.decode(&mut buffer, frame, false, 0, 0).expect("decode");
        assert_eq!(delivered, frame);
        assert_eq!(stamped_frame(&buffer), frame as u8);
    }
    assert_eq!(backend.seeks(), 2);
}
