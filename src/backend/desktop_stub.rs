//! Desktop stub backend: drives the real `RenderEngine` on a plain thread
//! with a synthetic silence source instead of a hardware device, so the
//! engine's logic can be exercised deterministically without audio hardware
//! (headless CI, the CLI demo, and backend-level tests).

use crate::error::EngineError;
use crate::render::{RenderBlock, RenderEngine};
use crate::ring_buffer::RingProducer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{AudioBackend, EngineStartContext, StreamInfo, TimeSource};

const STUB_SAMPLE_RATE: u32 = 48_000;
const STUB_BLOCK_FRAMES: usize = 512;

enum RecorderCommand {
    Attach(RingProducer),
    Detach,
    ResizeDelay(f32),
}

/// Desktop stub backend used for deterministic testing and CLI tooling.
///
/// Renders silence on the input side and discards output, but runs the same
/// `RenderEngine::process_block` path a real device backend would, at a
/// fixed sample rate and block size.
pub struct DesktopStubBackend {
    running: AtomicBool,
    shutdown_flag: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    recorder_cmd: Arc<Mutex<Vec<RecorderCommand>>>,
    last_dropped: Arc<AtomicU64>,
}

impl DesktopStubBackend {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            thread_handle: Mutex::new(None),
            recorder_cmd: Arc::new(Mutex::new(Vec::new())),
            last_dropped: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for DesktopStubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for DesktopStubBackend {
    fn start(&self, ctx: EngineStartContext) -> Result<StreamInfo, EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::InvalidState {
                reason: "backend already running".to_string(),
            });
        }

        self.shutdown_flag.store(false, Ordering::SeqCst);
        let shutdown_flag = Arc::clone(&self.shutdown_flag);
        let recorder_cmd = Arc::clone(&self.recorder_cmd);
        let last_dropped = Arc::clone(&self.last_dropped);

        let mut engine = RenderEngine::new(
            STUB_SAMPLE_RATE,
            ctx.click_pattern,
            ctx.params,
            ctx.input_latency_seconds,
            ctx.beat_tx,
            STUB_BLOCK_FRAMES,
        );

        let handle = thread::Builder::new()
            .name("metronome-desktop-stub".into())
            .spawn(move || {
                let mut out_left = vec![0.0f32; STUB_BLOCK_FRAMES];
                let mut out_right = vec![0.0f32; STUB_BLOCK_FRAMES];
                let silence = vec![0.0f32; STUB_BLOCK_FRAMES];

                while !shutdown_flag.load(Ordering::Relaxed) {
                    if let Ok(mut queue) = recorder_cmd.try_lock() {
                        for cmd in queue.drain(..) {
                            match cmd {
                                RecorderCommand::Attach(producer) => {
                                    engine.set_recorder(Some(producer));
                                }
                                RecorderCommand::Detach => {
                                    last_dropped
                                        .store(engine.recorder_dropped_samples(), Ordering::Release);
                                    engine.set_recorder(None);
                                }
                                RecorderCommand::ResizeDelay(latency_seconds) => {
                                    engine.resize_delay_line(latency_seconds);
                                }
                            }
                        }
                    }

                    engine.process_block(RenderBlock {
                        output_left: &mut out_left,
                        output_right: &mut out_right,
                        input_left: &silence,
                        input_right: &silence,
                        frame_count: STUB_BLOCK_FRAMES,
                    });

                    // Real time pacing so a test observing wall-clock
                    // elapsed time sees roughly real-time playback.
                    let block_duration =
                        Duration::from_secs_f64(STUB_BLOCK_FRAMES as f64 / STUB_SAMPLE_RATE as f64);
                    thread::sleep(block_duration);
                }
            })
            .map_err(|e| EngineError::ConfigurationFailed { reason: e.to_string() })?;

        *self.thread_handle.lock().unwrap() = Some(handle);

        Ok(StreamInfo {
            sample_rate: STUB_SAMPLE_RATE,
            measured_input_latency_seconds: 0.0,
        })
    }

    fn stop(&self) -> Result<(), EngineError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(EngineError::InvalidState {
                reason: "backend not running".to_string(),
            });
        }

        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn attach_recorder(&self, producer: RingProducer) -> Result<(), EngineError> {
        self.recorder_cmd.lock().unwrap().push(RecorderCommand::Attach(producer));
        Ok(())
    }

    fn detach_recorder(&self) -> Result<u64, EngineError> {
        self.recorder_cmd.lock().unwrap().push(RecorderCommand::Detach);
        // Give the render thread a chance to observe the command before we
        // report the dropped count; the stub is not real-time-critical.
        thread::sleep(Duration::from_millis(20));
        Ok(self.last_dropped.load(Ordering::Acquire))
    }

    fn set_input_latency(&self, input_latency_seconds: f32) -> Result<(), EngineError> {
        self.recorder_cmd
            .lock()
            .unwrap()
            .push(RecorderCommand::ResizeDelay(input_latency_seconds));
        Ok(())
    }
}

/// Deterministic time source for desktop runs.
///
/// Each call to `now()` advances by a fixed 10ms to guarantee monotonic
/// timestamps even when no real audio stream is active.
pub struct StubTimeSource {
    start: Instant,
    offset_ms: AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let ms = self.offset_ms.fetch_add(10, Ordering::SeqCst);
        self.start + Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::click::ClickPattern;
    use crate::render::RenderParams;

    fn ctx() -> EngineStartContext {
        let (beat_tx, _beat_rx) = rtrb::RingBuffer::<crate::click::BeatEvent>::new(64);
        EngineStartContext {
            click_pattern: Arc::new(ClickPattern::new(4)),
            params: Arc::new(RenderParams::new(120)),
            input_latency_seconds: 0.0,
            beat_tx,
        }
    }

    #[test]
    fn start_stop_lifecycle_without_real_device() {
        let backend = DesktopStubBackend::new();
        let info = backend.start(ctx()).expect("start");
        assert_eq!(info.sample_rate, STUB_SAMPLE_RATE);
        backend.stop().expect("stop");
    }

    #[test]
    fn double_start_is_rejected() {
        let backend = DesktopStubBackend::new();
        backend.start(ctx()).expect("start");
        assert!(backend.start(ctx()).is_err());
        backend.stop().expect("stop");
    }

    #[test]
    fn stop_without_start_is_rejected() {
        let backend = DesktopStubBackend::new();
        assert!(backend.stop().is_err());
    }
}
