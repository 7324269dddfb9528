//! CPAL-based audio backend for desktop platforms (Linux, macOS, Windows).
//!
//! Opens a default input (microphone) stream and a default output (speaker)
//! stream on one dedicated thread — CPAL's `Stream` isn't `Send`, so both
//! streams are built and kept alive in the same thread's stack. The input
//! stream pushes converted stereo samples into a small lock-free ring; the
//! output stream callback drains that ring non-blockingly each callback
//! before calling into `RenderEngine::process_block` — a master/slave
//! arrangement that keeps the single real-time-critical callback (the
//! output stream) free of any device I/O beyond a non-blocking ring read.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

use crate::error::EngineError;
use crate::render::{RenderBlock, RenderEngine};
use crate::ring_buffer::{ring_channel, RingConsumer, RingProducer};

use super::{AudioBackend, EngineStartContext, StreamInfo};

const INPUT_RING_CAPACITY: usize = 48_000 * 2; // ~1s of stereo headroom

enum RecorderCommand {
    Attach(RingProducer),
    Detach,
    ResizeDelay(f32),
}

/// Upper bound on the frame count CPAL hands a single callback; scratch
/// buffers are preallocated at this size outside the callback so the output
/// stream's audio thread never allocates.
const MAX_CALLBACK_FRAMES: usize = 8192;

pub struct CpalBackend {
    shutdown_flag: Arc<AtomicBool>,
    running: AtomicBool,
    sample_rate: Arc<AtomicU32>,
    stream_thread: Mutex<Option<JoinHandle<()>>>,
    recorder_cmd: Arc<Mutex<Vec<RecorderCommand>>>,
    last_dropped: Arc<std::sync::atomic::AtomicU64>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            sample_rate: Arc::new(AtomicU32::new(48_000)),
            stream_thread: Mutex::new(None),
            recorder_cmd: Arc::new(Mutex::new(Vec::new())),
            last_dropped: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    fn downmix_to_stereo_ring(
        data: &[f32],
        device_channels: usize,
        ring: &mut RingProducer,
    ) {
        if device_channels <= 1 {
            for &s in data {
                ring.write(s);
                ring.write(s);
            }
        } else {
            for frame in data.chunks(device_channels) {
                let l = frame[0];
                let r = if frame.len() > 1 { frame[1] } else { frame[0] };
                ring.write(l);
                ring.write(r);
            }
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn start(&self, ctx: EngineStartContext) -> Result<StreamInfo, EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::InvalidState {
                reason: "backend already running".to_string(),
            });
        }
        self.shutdown_flag.store(false, Ordering::SeqCst);

        let shutdown_flag = Arc::clone(&self.shutdown_flag);
        let sample_rate_store = Arc::clone(&self.sample_rate);
        let recorder_cmd = Arc::clone(&self.recorder_cmd);
        let last_dropped = Arc::clone(&self.last_dropped);

        let (result_tx, result_rx) = std::sync::mpsc::channel::<Result<StreamInfo, EngineError>>();

        let handle = thread::Builder::new()
            .name("metronome-cpal".into())
            .spawn(move || {
                let host = cpal::default_host();

                let output_device = match host.default_output_device() {
                    Some(d) => d,
                    None => {
                        let _ = result_tx.send(Err(EngineError::DeviceFailure {
                            code: 1,
                            context: "no default output device".to_string(),
                        }));
                        return;
                    }
                };

                let output_config = match output_device.default_output_config() {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = result_tx.send(Err(EngineError::ConfigurationFailed {
                            reason: format!("output config: {e}"),
                        }));
                        return;
                    }
                };

                let sample_rate = output_config.sample_rate().0;
                let output_channels = output_config.channels() as usize;
                sample_rate_store.store(sample_rate, Ordering::SeqCst);

                let (mut input_ring_tx, input_ring_rx) = ring_channel(INPUT_RING_CAPACITY);

                let input_device = host.default_input_device();
                let input_stream = input_device.and_then(|device| {
                    let config = device.default_input_config().ok()?;
                    let channels = config.channels() as usize;
                    let stream_config = StreamConfig {
                        channels: config.channels(),
                        sample_rate: config.sample_rate(),
                        buffer_size: cpal::BufferSize::Default,
                    };
                    let err_fn = |e| log::error!("[CpalBackend] input stream error: {e}");
                    match config.sample_format() {
                        SampleFormat::F32 => device
                            .build_input_stream(
                                &stream_config,
                                move |data: &[f32], _| {
                                    Self::downmix_to_stereo_ring(data, channels, &mut input_ring_tx);
                                },
                                err_fn,
                                None,
                            )
                            .ok(),
                        _ => None,
                    }
                });

                if input_stream.is_none() {
                    log::warn!("[CpalBackend] no usable input device; recording will capture silence");
                }
                if let Some(stream) = &input_stream {
                    if stream.play().is_err() {
                        log::warn!("[CpalBackend] failed to start input stream");
                    }
                }

                let mut engine = RenderEngine::new(
                    sample_rate,
                    ctx.click_pattern,
                    ctx.params,
                    ctx.input_latency_seconds,
                    ctx.beat_tx,
                    MAX_CALLBACK_FRAMES,
                );

                let mut input_ring_rx: RingConsumer = input_ring_rx;
                let output_stream_config = StreamConfig {
                    channels: output_config.channels(),
                    sample_rate: output_config.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                };

                let err_fn = |e| log::error!("[CpalBackend] output stream error: {e}");

                // Preallocated scratch, reused every callback so the
                // real-time output thread never allocates.
                let mut in_left = vec![0.0f32; MAX_CALLBACK_FRAMES];
                let mut in_right = vec![0.0f32; MAX_CALLBACK_FRAMES];
                let mut interleaved = vec![0.0f32; MAX_CALLBACK_FRAMES * 2];
                let mut out_left = vec![0.0f32; MAX_CALLBACK_FRAMES];
                let mut out_right = vec![0.0f32; MAX_CALLBACK_FRAMES];

                let stream = output_device.build_output_stream(
                    &output_stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if let Ok(mut queue) = recorder_cmd.try_lock() {
                            for cmd in queue.drain(..) {
                                match cmd {
                                    RecorderCommand::Attach(producer) => {
                                        engine.set_recorder(Some(producer));
                                    }
                                    RecorderCommand::Detach => {
                                        last_dropped.store(
                                            engine.recorder_dropped_samples(),
                                            Ordering::Release,
                                        );
                                        engine.set_recorder(None);
                                    }
                                    RecorderCommand::ResizeDelay(latency_seconds) => {
                                        engine.resize_delay_line(latency_seconds);
                                    }
                                }
                            }
                        }

                        // CPAL callbacks can in principle request more
                        // frames than our preallocated scratch holds;
                        // clamp rather than reallocate on the audio thread.
                        let frame_count =
                            (data.len() / output_channels).min(MAX_CALLBACK_FRAMES);

                        let read = input_ring_rx.read_into(&mut interleaved[..frame_count * 2]);
                        let frames_available = read / 2;
                        for i in in_left[..frame_count].iter_mut() {
                            *i = 0.0;
                        }
                        for i in in_right[..frame_count].iter_mut() {
                            *i = 0.0;
                        }
                        for i in 0..frames_available {
                            in_left[i] = interleaved[i * 2];
                            in_right[i] = interleaved[i * 2 + 1];
                        }

                        engine.process_block(RenderBlock {
                            output_left: &mut out_left[..frame_count],
                            output_right: &mut out_right[..frame_count],
                            input_left: &in_left[..frame_count],
                            input_right: &in_right[..frame_count],
                            frame_count,
                        });

                        for (i, frame) in data.chunks_mut(output_channels).enumerate().take(frame_count) {
                            let l = out_left.get(i).copied().unwrap_or(0.0);
                            let r = out_right.get(i).copied().unwrap_or(0.0);
                            if output_channels == 1 {
                                frame[0] = 0.5 * (l + r);
                            } else {
                                frame[0] = l;
                                if frame.len() > 1 {
                                    frame[1] = r;
                                }
                                for sample in frame.iter_mut().skip(2) {
                                    *sample = 0.0;
                                }
                            }
                        }
                        for frame in data.chunks_mut(output_channels).skip(frame_count) {
                            for sample in frame.iter_mut() {
                                *sample = 0.0;
                            }
                        }
                    },
                    err_fn,
                    None,
                );

                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = result_tx.send(Err(EngineError::ConfigurationFailed {
                            reason: format!("build output stream: {e}"),
                        }));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = result_tx.send(Err(EngineError::DeviceFailure {
                        code: 2,
                        context: format!("output stream play: {e}"),
                    }));
                    return;
                }

                let _ = result_tx.send(Ok(StreamInfo {
                    sample_rate,
                    measured_input_latency_seconds: 0.0,
                }));

                while !shutdown_flag.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(50));
                }

                drop(stream);
                drop(input_stream);
            })
            .map_err(|e| EngineError::ConfigurationFailed { reason: e.to_string() })?;

        let info = match result_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(EngineError::DeviceFailure {
                    code: 3,
                    context: "timeout starting audio stream".to_string(),
                });
            }
        };

        *self.stream_thread.lock().unwrap() = Some(handle);
        Ok(info)
    }

    fn stop(&self) -> Result<(), EngineError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(EngineError::InvalidState {
                reason: "backend not running".to_string(),
            });
        }
        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.stream_thread.lock().unwrap().take() {
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
        thread::sleep(Duration::from_millis(50));
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
