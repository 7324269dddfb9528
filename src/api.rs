//! Thin host-facing entry points over a lazily-constructed global controller.
//!
//! A single `Lazy` instance holds all engine state; every public function is
//! a one-line delegation, kept in plain Rust (no FFI-bridge macros) so a
//! future FFI layer can wrap these functions directly.

use std::path::PathBuf;

use futures::Stream;
use once_cell::sync::Lazy;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::backend::{AudioBackend, StreamInfo};
use crate::config::EngineConfig;
use crate::controller::{Controller, RecordingSummary};
use crate::error::EngineError;
use crate::telemetry::TelemetryEvent;

const DEFAULT_BPM: u32 = 120;
const DEFAULT_TIME_SIGNATURE: u32 = 4;

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        fn make_backend() -> Box<dyn AudioBackend> {
            Box::new(crate::backend::OboeBackend::new())
        }

        fn load_config() -> EngineConfig {
            EngineConfig::load_android()
        }
    } else {
        fn make_backend() -> Box<dyn AudioBackend> {
            Box::new(crate::backend::CpalBackend::new())
        }

        fn load_config() -> EngineConfig {
            EngineConfig::load()
        }
    }
}

/// Global controller instance — single owner of the backend, click pattern,
/// and transport state, constructed on first use.
static CONTROLLER: Lazy<Controller> = Lazy::new(|| {
    Controller::new(make_backend(), load_config(), DEFAULT_BPM, DEFAULT_TIME_SIGNATURE)
});

/// Open the audio device and start the render loop. Transport starts paused.
pub fn init() -> Result<StreamInfo, EngineError> {
    CONTROLLER.init()
}

/// Stop the audio device and tear down background threads.
pub fn destroy() -> Result<(), EngineError> {
    CONTROLLER.destroy()
}

pub fn play() {
    CONTROLLER.play();
}

pub fn pause() {
    CONTROLLER.pause();
}

pub fn is_playing() -> bool {
    CONTROLLER.is_playing()
}

pub fn set_bpm(bpm: u32) -> Result<(), EngineError> {
    CONTROLLER.set_bpm(bpm)
}

pub fn get_bpm() -> u32 {
    CONTROLLER.get_bpm()
}

pub fn set_time_signature(time_signature: u32) -> Result<(), EngineError> {
    CONTROLLER.set_time_signature(time_signature)
}

pub fn get_time_signature() -> u32 {
    CONTROLLER.get_time_signature()
}

pub fn set_volume(volume: f32) {
    CONTROLLER.set_volume(volume);
}

pub fn get_volume() -> f32 {
    CONTROLLER.get_volume()
}

pub fn set_mic_volume(volume: f32) {
    CONTROLLER.set_mic_volume(volume);
}

pub fn enable_microphone(enabled: bool) {
    CONTROLLER.enable_microphone(enabled);
}

/// Load normal/accent click sounds from WAV files on disk.
pub fn set_audio_file(normal_path: PathBuf, accent_path: Option<PathBuf>) -> Result<(), EngineError> {
    CONTROLLER.set_audio_file(&normal_path, accent_path.as_deref())
}

pub fn start_recording(path: PathBuf) -> Result<(), EngineError> {
    CONTROLLER.start_recording(path)
}

pub fn stop_recording() -> Result<RecordingSummary, EngineError> {
    CONTROLLER.stop_recording()
}

/// Stream of beat-in-bar indices (`0` is the downbeat), one event per beat
/// boundary crossed while the engine is playing.
pub fn subscribe_beat_events() -> broadcast::Receiver<u32> {
    CONTROLLER.subscribe_beat_events()
}

/// Stream of lifecycle/telemetry events (engine start/stop, tempo changes,
/// recording start/stop, ring overruns).
pub fn subscribe_telemetry() -> broadcast::Receiver<TelemetryEvent> {
    CONTROLLER.subscribe_telemetry()
}

/// `beat_events_stream`/`telemetry_stream` below wrap the broadcast receivers
/// as `futures::Stream`s so a host bridge that expects an async stream type
/// rather than a raw receiver can await these directly. Lagged deliveries (a
/// slow consumer falling behind the broadcast buffer) are dropped rather
/// than surfaced, since every event here is a "latest state" style update a
/// host UI can tolerate missing.
pub fn beat_events_stream() -> impl Stream<Item = u32> {
    BroadcastStream::new(subscribe_beat_events()).filter_map(Result::ok)
}

pub fn telemetry_stream() -> impl Stream<Item = TelemetryEvent> {
    BroadcastStream::new(subscribe_telemetry()).filter_map(Result::ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_pause_roundtrip_through_global_controller() {
        assert!(!is_playing());
        play();
        assert!(is_playing());
        pause();
        assert!(!is_playing());
    }

    #[test]
    fn set_bpm_rejects_zero_through_global_controller() {
        assert!(set_bpm(0).is_err());
        assert!(get_bpm() > 0);
    }

    #[tokio::test]
    async fn beat_events_stream_yields_nothing_without_playback() {
        use std::time::Duration;
        let mut stream = Box::pin(beat_events_stream());
        let result = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(result.is_err(), "no beats should fire while the engine isn't playing");
    }
}
