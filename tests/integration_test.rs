//! Integration tests for the full `Controller` lifecycle.
//!
//! Drives a real `DesktopStubBackend`-backed engine end-to-end — init, play,
//! tempo changes, recording — rather than exercising individual modules in
//! isolation.

use std::thread;
use std::time::Duration;

use metronome_engine::backend::DesktopStubBackend;
use metronome_engine::config::EngineConfig;
use metronome_engine::controller::Controller;
use metronome_engine::error::EngineError;

fn test_controller(bpm: u32, time_signature: u32) -> Controller {
    Controller::new(Box::new(DesktopStubBackend::new()), EngineConfig::default(), bpm, time_signature)
}

/// Beat events land in `0, 1, ..., ts-1` order, wrapping every bar, while
/// playing.
#[test]
fn beat_events_cycle_through_bar_positions() {
    let controller = test_controller(240, 4);
    controller.init().expect("init");
    let mut events = controller.subscribe_beat_events();
    controller.play();

    thread::sleep(Duration::from_millis(1200));
    controller.pause();
    controller.destroy().expect("destroy");

    let mut seen = Vec::new();
    while let Ok(beat) = events.try_recv() {
        seen.push(beat);
    }

    assert!(!seen.is_empty(), "expected at least one beat event during playback");
    for window in seen.windows(2) {
        let (prev, next) = (window[0], window[1]);
        assert!(
            next == (prev + 1) % 4 || next == 0,
            "beat {next} did not follow {prev} in bar order"
        );
    }
}

/// A full init -> play -> record -> stop -> destroy cycle produces a
/// recording summary whose timestamps are non-empty and monotonically
/// non-decreasing.
#[test]
fn full_lifecycle_produces_monotonic_timestamps() {
    let controller = test_controller(120, 4);
    controller.init().expect("init");
    controller.play();

    let path = std::env::temp_dir().join("metronome_engine_integration_lifecycle.wav");
    controller.start_recording(path.clone()).expect("start recording");

    thread::sleep(Duration::from_millis(600));

    let summary = controller.stop_recording().expect("stop recording");
    controller.destroy().expect("destroy");

    assert_eq!(summary.path, path);
    assert_eq!(summary.bpm, 120);
    assert_eq!(summary.time_signature, 4);
    assert!(!summary.timestamps.is_empty());
    for window in summary.timestamps.windows(2) {
        assert!(window[1] >= window[0], "timestamps must be non-decreasing");
    }

    let _ = std::fs::remove_file(&path);
}

/// Starting a second recording while one is active is rejected, and the
/// first recording's file is left untouched.
#[test]
fn concurrent_recording_attempts_are_rejected() {
    let controller = test_controller(100, 4);
    controller.init().expect("init");
    controller.play();

    let first = std::env::temp_dir().join("metronome_engine_integration_first.wav");
    let second = std::env::temp_dir().join("metronome_engine_integration_second.wav");

    controller.start_recording(first.clone()).expect("first recording starts");
    let err = controller
        .start_recording(second.clone())
        .expect_err("second recording should be rejected while one is active");
    assert!(matches!(err, EngineError::InvalidState { .. }));

    let _summary = controller.stop_recording().expect("stop recording");
    controller.destroy().expect("destroy");

    assert!(first.exists());
    assert!(!second.exists());
    let _ = std::fs::remove_file(&first);
}

/// Tempo and time-signature changes while running propagate immediately to
/// subsequent beat events without requiring a restart.
#[test]
fn tempo_change_while_playing_is_reflected_in_getters() {
    let controller = test_controller(120, 4);
    controller.init().expect("init");
    controller.play();

    controller.set_bpm(180).expect("set_bpm");
    assert_eq!(controller.get_bpm(), 180);

    controller.set_time_signature(3).expect("set_time_signature");
    assert_eq!(controller.get_time_signature(), 3);

    controller.destroy().expect("destroy");
}
