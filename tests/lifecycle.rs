//! Open / close / reopen lifecycle tests.

mod common;

use std::path::PathBuf;

use common::{StubBackend, StubScript, frame_buffer, open_stub, stamped_frame};
use frameseek::{FrameSeekError, MediaFile};

#[test]
fn close_releases_everything() {
    let (_backend, file) = open_stub(StubScript::with_frames(20));
    assert!(file.is_open());
    assert!(file.is_valid());
    assert_eq!(file.path(), Some(PathBuf::from("clip.mov")));

    file.close();

    assert!(!file.is_open());
    assert!(!file.is_valid());
    assert_eq!(file.path(), None);
    assert_eq!(file.stream_count(), 0);
    assert!(matches!(file.info(0), Err(FrameSeekError::FileNotOpen)));
    assert!(matches!(
        file.stream_metadata(0),
        Err(FrameSeekError::FileNotOpen)
    ));
}

#[test]
fn close_is_idempotent() {
    let file = MediaFile::with_backend(StubBackend::new(StubScript::default()));
    file.close();
    file.close();
    assert!(!file.is_open());

    file.open("clip.mov").expect("open");
    file.close();
    file.close();
    assert!(!file.is_open());
}

#[test]
fn reopen_derives_fresh_stream_state() {
    let (backend, file) = open_stub(StubScript::with_frames(20));
    assert_eq!(file.info(0).expect("info").frame_count, 20);

    backend.update(|script| {
        script.frame_count = 50;
        script.declared_frames = Some(50);
    });
    file.close();
    file.open("clip.mov").expect("reopen");

    assert_eq!(file.info(0).expect("info").frame_count, 50);
    let mut buffer = frame_buffer(&file);
    assert_eq!(file.decode(&mut buffer, 45, false, 10, 0).expect("decode"), 45);
    assert_eq!(stamped_frame(&buffer), 45);
}

#[test]
fn open_replaces_an_open_file() {
    let (backend, file) = open_stub(StubScript::with_frames(30));
    let mut buffer = frame_buffer(&file);
    file.decode(&mut buffer, 10, false, 10, 0).expect("decode");

    file.open("other.mov").expect("open without close");
    assert_eq!(file.path(), Some(PathBuf::from("other.mov")));
    assert!(file.is_valid());

    // The new file starts unpositioned, so frame 11 needs a fresh seek.
    backend.clear_events();
    file.decode(&mut buffer, 11, false, 10, 0).expect("decode");
    assert_eq!(stamped_frame(&buffer), 11);
    assert_eq!(backend.seeks(), 1);
}

#[test]
fn successful_open_clears_previous_failure() {
    let file = MediaFile::with_backend(StubBackend::new(StubScript::with_frames(10)));

    assert!(file.open("missing.mov").is_err());
    assert!(file.last_error().is_some());
    assert!(!file.is_valid());

    file.open("clip.mov").expect("open");
    assert!(file.last_error().is_none());
    assert!(file.is_valid());
    assert_eq!(file.stream_count(), 1);
}

#[test]
fn recoverable_errors_keep_the_file_valid() {
    let (_backend, file) = open_stub(StubScript::with_frames(10));
    let mut buffer = frame_buffer(&file);

    assert!(file.decode(&mut buffer, 10, false, 0, 0).is_err());
    assert!(file.is_valid());
    assert!(
        file.last_error()
            .expect("last error")
            .contains("Missing frame 10")
    );

    assert_eq!(file.decode(&mut buffer, 4, false, 0, 0).expect("decode"), 4);
}

#[test]
fn debug_output_reports_state() {
    let (_backend, file) = open_stub(StubScript::with_frames(10));
    let rendered = format!("{file:?}");
    assert!(rendered.contains("state: \"open\""), "{rendered}");
    assert!(rendered.contains("stream_count: 1"), "{rendered}");

    file.close();
    assert!(format!("{file:?}").contains("state: \"closed\""));
}
