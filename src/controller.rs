//! Host-facing lifecycle object: owns the backend, click pattern, transport
//! parameters, and active recording session.
//!
//! The single owner of the audio backend that the thin `api` module
//! delegates to, translating host calls into atomic parameter writes and
//! backend lifecycle calls, and re-publishing render-thread beat events onto
//! a host-thread `tokio::sync::broadcast` channel.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::backend::{AudioBackend, EngineStartContext, StreamInfo};
use crate::click::{BeatEvent, ClickBuffers, ClickPattern};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::render::RenderParams;
use crate::ring_buffer::ring_channel;
use crate::telemetry::{TelemetryEvent, TelemetryHub};
use crate::writer::FileWriter;

const BEAT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Returned by `stop_recording`: what the session captured.
///
/// A tagged result value in place of an untyped host-boundary dictionary:
/// `{ path, timestamps[], bpm, time_signature, dropped_samples }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub path: PathBuf,
    /// Seconds-from-recording-start of every beat boundary crossed while
    /// this session was recording.
    pub timestamps: Vec<f64>,
    pub bpm: u32,
    pub time_signature: u32,
    pub dropped_samples: u64,
}

struct RecordingSession {
    path: PathBuf,
    writer: FileWriter,
    start_bpm: u32,
    start_time_signature: u32,
}

pub struct Controller {
    backend: Box<dyn AudioBackend>,
    params: Arc<RenderParams>,
    click_pattern: Arc<ClickPattern>,
    config: EngineConfig,
    telemetry: TelemetryHub,
    beat_events_tx: broadcast::Sender<u32>,
    stream_info: Mutex<Option<StreamInfo>>,
    recording: Mutex<Option<RecordingSession>>,
    /// Seconds-from-playback-start of every beat boundary crossed while
    /// `is_recording` was set, accumulated by the beat-drain thread and
    /// drained into the `RecordingSummary` on `stop_recording`.
    recording_timestamps: Arc<Mutex<Vec<f64>>>,
    beat_drain_shutdown: Arc<std::sync::atomic::AtomicBool>,
    beat_drain_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    pub fn new(backend: Box<dyn AudioBackend>, config: EngineConfig, initial_bpm: u32, time_signature: u32) -> Self {
        let (beat_events_tx, _rx) = broadcast::channel(BEAT_EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            params: Arc::new(RenderParams::new(initial_bpm)),
            click_pattern: Arc::new(ClickPattern::new(time_signature)),
            config,
            telemetry: TelemetryHub::new(),
            beat_events_tx,
            stream_info: Mutex::new(None),
            recording: Mutex::new(None),
            recording_timestamps: Arc::new(Mutex::new(Vec::new())),
            beat_drain_shutdown: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            beat_drain_handle: Mutex::new(None),
        }
    }

    /// Open the audio device and start the render loop. Transport state
    /// starts paused (`is_playing = false`): the stream is live so `play()`
    /// has no device-open latency, but no click is rendered until the host
    /// calls `play()`.
    pub fn init(&self) -> Result<StreamInfo, EngineError> {
        let (beat_tx, beat_rx) = rtrb::RingBuffer::<BeatEvent>::new(256);

        let ctx = EngineStartContext {
            click_pattern: Arc::clone(&self.click_pattern),
            params: Arc::clone(&self.params),
            input_latency_seconds: self.config.latency.default_input_latency_seconds,
            beat_tx,
        };

        let info = self.backend.start(ctx)?;
        *self.stream_info.lock().unwrap() = Some(info);

        self.beat_drain_shutdown.store(false, Ordering::SeqCst);
        let shutdown = Arc::clone(&self.beat_drain_shutdown);
        let events_tx = self.beat_events_tx.clone();
        let drain_params = Arc::clone(&self.params);
        let recording_timestamps = Arc::clone(&self.recording_timestamps);
        let sample_rate = info.sample_rate as f64;
        let handle = thread::Builder::new()
            .name("metronome-beat-drain".into())
            .spawn(move || {
                let mut beat_rx = beat_rx;
                let mut scratch = [BeatEvent { sample_position: 0, beat_in_bar: 0 }; 64];
                while !shutdown.load(Ordering::Relaxed) {
                    let mut read = 0;
                    while read < scratch.len() {
                        match beat_rx.pop() {
                            Ok(beat) => {
                                scratch[read] = beat;
                                read += 1;
                            }
                            Err(_) => break,
                        }
                    }
                    if read > 0 && drain_params.is_recording.load(Ordering::Acquire) {
                        let mut timestamps = recording_timestamps.lock().unwrap();
                        for event in &scratch[..read] {
                            timestamps.push(event.sample_position as f64 / sample_rate);
                        }
                    }
                    for event in &scratch[..read] {
                        let _ = events_tx.send(event.beat_in_bar);
                    }
                    if read == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
            .expect("spawn beat drain thread");
        *self.beat_drain_handle.lock().unwrap() = Some(handle);

        self.telemetry.publish(TelemetryEvent::EngineStarted {
            sample_rate: info.sample_rate,
        });
        Ok(info)
    }

    /// Stop the audio device and tear down background threads. Idempotent:
    /// calling this while already stopped returns the backend's error, which
    /// the host may safely ignore.
    pub fn destroy(&self) -> Result<(), EngineError> {
        self.backend.stop()?;
        self.beat_drain_shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.beat_drain_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.telemetry.publish(TelemetryEvent::EngineStopped);
        Ok(())
    }

    pub fn play(&self) {
        self.params.is_playing.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.params.is_playing.store(false, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.params.is_playing.load(Ordering::Acquire)
    }

    pub fn set_bpm(&self, bpm: u32) -> Result<(), EngineError> {
        if bpm == 0 {
            return Err(EngineError::InvalidState {
                reason: "bpm must be greater than zero".to_string(),
            });
        }
        self.params.bpm.store(bpm, Ordering::Release);
        self.telemetry.publish(TelemetryEvent::TempoChanged { bpm });
        Ok(())
    }

    pub fn get_bpm(&self) -> u32 {
        self.params.bpm.load(Ordering::Acquire)
    }

    pub fn set_time_signature(&self, time_signature: u32) -> Result<(), EngineError> {
        // 0 is spec-legal (disables accent selection); ClickPattern clamps
        // it internally rather than rejecting it here.
        self.click_pattern.set_time_signature(time_signature);
        Ok(())
    }

    pub fn get_time_signature(&self) -> u32 {
        self.click_pattern.time_signature()
    }

    pub fn set_volume(&self, volume: f32) {
        let millis = (volume.clamp(0.0, 4.0) * 1000.0) as u32;
        self.params.click_gain_millis.store(millis, Ordering::Release);
    }

    pub fn get_volume(&self) -> f32 {
        self.params.click_gain_millis.load(Ordering::Acquire) as f32 / 1000.0
    }

    pub fn set_mic_volume(&self, volume: f32) {
        let millis = (volume.clamp(0.0, 4.0) * 1000.0) as u32;
        self.params.mic_gain_millis.store(millis, Ordering::Release);
    }

    pub fn enable_microphone(&self, enabled: bool) {
        self.params.monitoring_enabled.store(enabled, Ordering::Release);
    }

    /// Load normal/accent click buffers from WAV files on disk. Decoding
    /// format is out of the render path's scope, so this is a host-thread,
    /// blocking-I/O operation called between blocks, never from the
    /// callback.
    pub fn set_audio_file(&self, normal_path: &Path, accent_path: Option<&Path>) -> Result<(), EngineError> {
        let normal = read_wav_mono(normal_path)?;
        let accent = match accent_path {
            Some(p) => read_wav_mono(p)?,
            None => Vec::new(),
        };
        self.click_pattern.set_buffers(ClickBuffers { normal, accent });
        Ok(())
    }

    pub fn subscribe_beat_events(&self) -> broadcast::Receiver<u32> {
        self.beat_events_tx.subscribe()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry.subscribe()
    }

    pub fn start_recording(&self, path: PathBuf) -> Result<(), EngineError> {
        let mut recording = self.recording.lock().unwrap();
        if recording.is_some() {
            return Err(EngineError::InvalidState {
                reason: "a recording is already in progress".to_string(),
            });
        }

        let info = self
            .stream_info
            .lock()
            .unwrap()
            .ok_or_else(|| EngineError::InvalidState {
                reason: "engine not initialized".to_string(),
            })?;

        let capacity =
            (self.config.ring_buffer.capacity_seconds * info.sample_rate as f32 * 2.0) as usize;
        let (producer, consumer) = ring_channel(capacity.max(1024));

        let idle_sleep = Duration::from_micros(self.config.writer.idle_sleep_micros);
        let writer = FileWriter::spawn(path.clone(), info.sample_rate, consumer, idle_sleep)?;

        self.recording_timestamps.lock().unwrap().clear();
        // Only override the delay line from a live measurement when the
        // backend actually reports one; a hardcoded 0.0 (no backend queries
        // round-trip latency yet) must not clobber the configured default
        // set when the engine initialized.
        if info.measured_input_latency_seconds > 0.0 {
            self.backend.set_input_latency(info.measured_input_latency_seconds)?;
        }
        self.backend.attach_recorder(producer)?;
        self.params.is_recording.store(true, Ordering::Release);

        *recording = Some(RecordingSession {
            path,
            writer,
            start_bpm: self.get_bpm(),
            start_time_signature: self.get_time_signature(),
        });

        self.telemetry.publish(TelemetryEvent::RecordingStarted);
        Ok(())
    }

    pub fn stop_recording(&self) -> Result<RecordingSummary, EngineError> {
        let session = self
            .recording
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| EngineError::InvalidState {
                reason: "no recording is in progress".to_string(),
            })?;

        self.params.is_recording.store(false, Ordering::Release);
        let dropped_samples = self.backend.detach_recorder()?;
        session.writer.stop()?;

        let timestamps = std::mem::take(&mut *self.recording_timestamps.lock().unwrap());

        self.telemetry
            .publish(TelemetryEvent::RecordingStopped { dropped_samples });

        Ok(RecordingSummary {
            path: session.path,
            timestamps,
            bpm: session.start_bpm,
            time_signature: session.start_time_signature,
            dropped_samples,
        })
    }
}

fn read_wav_mono(path: &Path) -> Result<Vec<f32>, EngineError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(EngineError::from)?,
        SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<_>, _>>()
                .map_err(EngineError::from)?
        }
    };

    if spec.channels <= 1 {
        Ok(samples)
    } else {
        let channels = spec.channels as usize;
        Ok(samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DesktopStubBackend;

    fn test_controller() -> Controller {
        Controller::new(Box::new(DesktopStubBackend::new()), EngineConfig::default(), 120, 4)
    }

    #[test]
    fn play_pause_toggles_is_playing() {
        let controller = test_controller();
        assert!(!controller.is_playing());
        controller.play();
        assert!(controller.is_playing());
        controller.pause();
        assert!(!controller.is_playing());
    }

    #[test]
    fn set_bpm_rejects_zero() {
        let controller = test_controller();
        assert!(controller.set_bpm(0).is_err());
        assert_eq!(controller.get_bpm(), 120);
    }

    #[test]
    fn set_bpm_updates_readback() {
        let controller = test_controller();
        controller.set_bpm(180).unwrap();
        assert_eq!(controller.get_bpm(), 180);
    }

    #[test]
    fn set_time_signature_accepts_zero_and_disables_accent() {
        let controller = test_controller();
        assert!(controller.set_time_signature(0).is_ok());
        assert_eq!(controller.get_time_signature(), 1);
    }

    #[test]
    fn volume_roundtrips_through_millis_encoding() {
        let controller = test_controller();
        controller.set_volume(0.5);
        assert!((controller.get_volume() - 0.5).abs() < 0.001);
    }

    #[test]
    fn start_recording_without_init_is_rejected() {
        let controller = test_controller();
        let path = std::env::temp_dir().join("controller_test_no_init.wav");
        assert!(controller.start_recording(path).is_err());
    }

    #[test]
    fn stop_recording_without_start_is_rejected() {
        let controller = test_controller();
        assert!(controller.stop_recording().is_err());
    }

    #[test]
    fn full_init_play_record_stop_lifecycle() {
        let controller = test_controller();
        controller.init().expect("init");
        controller.play();

        let path = std::env::temp_dir().join("controller_test_lifecycle.wav");
        controller.start_recording(path.clone()).expect("start recording");
        assert!(controller.start_recording(path.clone()).is_err());

        thread::sleep(Duration::from_millis(100));

        let summary = controller.stop_recording().expect("stop recording");
        assert_eq!(summary.path, path);
        assert_eq!(summary.bpm, 120);
        assert_eq!(summary.time_signature, 4);
        assert!(!summary.timestamps.is_empty(), "expected at least one beat boundary during a 100ms recording at 120bpm");

        controller.destroy().expect("destroy");

        let _ = std::fs::remove_file(&path);
    }
}
