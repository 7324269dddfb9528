//! The render-thread core: mixes click, live microphone, and delayed click
//! into the output/monitor/record paths once per audio callback.
//!
//! `process_block` takes plain, backend-agnostic stereo slices so
//! `CpalBackend`, `OboeBackend`, `DesktopStubBackend`, and tests can all
//! drive the same logic. Never allocates, never locks, never blocks on I/O,
//! never logs — failures are tolerated locally (silence substitution,
//! dropped-sample counting) and only surfaced to the host on the next
//! parameter read.

use crate::click::{BeatEvent, ClickPattern, ClickVoice};
use crate::clock::SampleClock;
use crate::delay_line::LatencyDelayLine;
use crate::ring_buffer::RingProducer;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// One block of non-interleaved stereo audio passed to `process_block`.
/// `input_left`/`input_right` may be empty if the backend could not supply
/// microphone data for this block (tolerated: monitor/record mix falls back
/// to silence for that block).
pub struct RenderBlock<'a> {
    pub output_left: &'a mut [f32],
    pub output_right: &'a mut [f32],
    pub input_left: &'a [f32],
    pub input_right: &'a [f32],
    pub frame_count: usize,
}

/// Parameters shared between the host/controller thread and the render
/// thread. Every field is an atomic so the host can update it without
/// coordinating with the render thread; the render thread snapshots each
/// one exactly once per block to avoid intra-block tearing.
pub struct RenderParams {
    pub bpm: AtomicU32,
    pub click_gain_millis: AtomicU32, // gain * 1000, since AtomicF32 isn't in std
    pub mic_gain_millis: AtomicU32,
    pub is_playing: AtomicBool,
    pub is_recording: AtomicBool,
    pub monitoring_enabled: AtomicBool,
}

impl RenderParams {
    pub fn new(initial_bpm: u32) -> Self {
        Self {
            bpm: AtomicU32::new(initial_bpm),
            click_gain_millis: AtomicU32::new(1000),
            mic_gain_millis: AtomicU32::new(1000),
            is_playing: AtomicBool::new(false),
            is_recording: AtomicBool::new(false),
            monitoring_enabled: AtomicBool::new(false),
        }
    }
}

struct ParamSnapshot {
    bpm: u32,
    click_gain: f32,
    mic_gain: f32,
    is_playing: bool,
    is_recording: bool,
    monitoring_enabled: bool,
}

impl RenderParams {
    fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            bpm: self.bpm.load(Ordering::Acquire),
            click_gain: self.click_gain_millis.load(Ordering::Acquire) as f32 / 1000.0,
            mic_gain: self.mic_gain_millis.load(Ordering::Acquire) as f32 / 1000.0,
            is_playing: self.is_playing.load(Ordering::Acquire),
            is_recording: self.is_recording.load(Ordering::Acquire),
            monitoring_enabled: self.monitoring_enabled.load(Ordering::Acquire),
        }
    }
}

/// Owns the per-block mixing pipeline. One instance per active stream;
/// constructed by the backend, driven once per callback via
/// `process_block`.
pub struct RenderEngine {
    clock: SampleClock,
    click_pattern: Arc<ClickPattern>,
    params: Arc<RenderParams>,
    click_delay: LatencyDelayLine,
    recorder_tx: Option<RingProducer>,
    beat_tx: rtrb::Producer<BeatEvent>,
    scratch_click_left: Vec<f32>,
    scratch_click_right: Vec<f32>,
    scratch_delay_left: Vec<f32>,
    scratch_delay_right: Vec<f32>,
}

impl RenderEngine {
    pub fn new(
        sample_rate: u32,
        click_pattern: Arc<ClickPattern>,
        params: Arc<RenderParams>,
        input_latency_seconds: f32,
        beat_tx: rtrb::Producer<BeatEvent>,
        max_block_frames: usize,
    ) -> Self {
        Self {
            clock: SampleClock::new(sample_rate),
            click_pattern,
            params,
            click_delay: LatencyDelayLine::new(input_latency_seconds, sample_rate),
            recorder_tx: None,
            beat_tx,
            scratch_click_left: vec![0.0; max_block_frames],
            scratch_click_right: vec![0.0; max_block_frames],
            scratch_delay_left: vec![0.0; max_block_frames],
            scratch_delay_right: vec![0.0; max_block_frames],
        }
    }

    pub fn click_pattern(&self) -> &Arc<ClickPattern> {
        &self.click_pattern
    }

    /// Attach (or detach, with `None`) the ring producer the recording
    /// writer thread drains. Called from the host thread between blocks;
    /// the render thread only ever sees a fully-constructed producer.
    pub fn set_recorder(&mut self, producer: Option<RingProducer>) {
        self.recorder_tx = producer;
    }

    pub fn recorder_dropped_samples(&self) -> u64 {
        self.recorder_tx.as_ref().map(|p| p.dropped_count()).unwrap_or(0)
    }

    /// Re-size the click-compensation delay line from a freshly measured
    /// input latency. Called from the host thread (via a backend command,
    /// never directly) when arming a recording — the input latency used at
    /// `RenderEngine::new` time is only a configured default until the
    /// device reports its actual figure.
    pub fn resize_delay_line(&mut self, input_latency_seconds: f32) {
        self.click_delay = LatencyDelayLine::new(input_latency_seconds, self.clock.sample_rate());
    }

    /// The render-thread entry point, called once per audio callback.
    pub fn process_block(&mut self, block: RenderBlock<'_>) {
        let RenderBlock {
            output_left,
            output_right,
            input_left,
            input_right,
            frame_count,
        } = block;

        let snap = self.params.snapshot();

        for s in output_left[..frame_count].iter_mut() {
            *s = 0.0;
        }
        for s in output_right[..frame_count].iter_mut() {
            *s = 0.0;
        }

        let click_left = &mut self.scratch_click_left[..frame_count];
        let click_right = &mut self.scratch_click_right[..frame_count];
        for s in click_left.iter_mut() {
            *s = 0.0;
        }
        for s in click_right.iter_mut() {
            *s = 0.0;
        }

        if snap.is_playing {
            let p0 = self.clock.position();
            let beat_tx = &mut self.beat_tx;
            ClickVoice::render(
                &self.click_pattern,
                self.clock.sample_rate() as f64,
                snap.bpm,
                p0,
                frame_count,
                click_left,
                click_right,
                |event| {
                    let _ = beat_tx.push(event);
                },
            );
        }

        for s in click_left.iter_mut() {
            *s *= snap.click_gain;
        }
        for s in click_right.iter_mut() {
            *s *= snap.click_gain;
        }

        // Output path: click only (live mic is never sent to the speaker
        // output to avoid feedback, matching the monitor/record distinction
        // in the data model).
        output_left[..frame_count].copy_from_slice(click_left);
        output_right[..frame_count].copy_from_slice(click_right);

        // Monitor path: live mic, gained, summed into the output for
        // headphone monitoring while recording.
        if snap.is_recording && snap.monitoring_enabled && !input_left.is_empty() {
            for i in 0..frame_count {
                output_left[i] += input_left.get(i).copied().unwrap_or(0.0) * snap.mic_gain;
                output_right[i] += input_right.get(i).copied().unwrap_or(0.0) * snap.mic_gain;
            }
        }

        // Record path: latency-compensated click mixed with live mic,
        // pushed to the writer thread through the lock-free ring. Tolerant
        // of a missing recorder (not currently recording) or a missing
        // input block (backend couldn't supply mic data this callback).
        if snap.is_recording {
            self.click_delay.push_block(click_left, click_right);

            let delayed_left = &mut self.scratch_delay_left[..frame_count];
            let delayed_right = &mut self.scratch_delay_right[..frame_count];
            self.click_delay.read_block(delayed_left, delayed_right);

            if let Some(producer) = self.recorder_tx.as_mut() {
                for i in 0..frame_count {
                    let mic_l = input_left.get(i).copied().unwrap_or(0.0) * snap.mic_gain;
                    let mic_r = input_right.get(i).copied().unwrap_or(0.0) * snap.mic_gain;
                    producer.write(delayed_left[i] + mic_l);
                    producer.write(delayed_right[i] + mic_r);
                }
            }
        }

        self.clock.advance(frame_count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::click::ClickPattern;
    use crate::ring_buffer::ring_channel;

    fn engine_with_params(
        params: Arc<RenderParams>,
        sample_rate: u32,
    ) -> (RenderEngine, rtrb::Consumer<BeatEvent>) {
        let (beat_tx, beat_rx) = rtrb::RingBuffer::<BeatEvent>::new(64);
        let click_pattern = Arc::new(ClickPattern::new(4));
        let engine = RenderEngine::new(sample_rate, click_pattern, params, 0.0, beat_tx, 4096);
        (engine, beat_rx)
    }

    #[test]
    fn silent_when_not_playing() {
        let params = Arc::new(RenderParams::new(120));
        let (mut engine, _beat_rx) = engine_with_params(params, 48_000);

        let mut out_l = vec![1.0; 128];
        let mut out_r = vec![1.0; 128];
        engine.process_block(RenderBlock {
            output_left: &mut out_l,
            output_right: &mut out_r,
            input_left: &[],
            input_right: &[],
            frame_count: 128,
        });

        assert!(out_l.iter().all(|&s| s == 0.0));
        assert!(out_r.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn monitoring_enabled_without_recording_does_not_bleed_mic_into_output() {
        // spec.md §4.5 step 5: the live mic is only summed into the output
        // when monitoring is enabled AND a recording is in progress.
        let params = Arc::new(RenderParams::new(120));
        params.monitoring_enabled.store(true, Ordering::Release);
        let (mut engine, _beat_rx) = engine_with_params(params, 48_000);

        let mut out_l = vec![0.0; 32];
        let mut out_r = vec![0.0; 32];
        let in_l = vec![1.0; 32];
        let in_r = vec![1.0; 32];
        engine.process_block(RenderBlock {
            output_left: &mut out_l,
            output_right: &mut out_r,
            input_left: &in_l,
            input_right: &in_r,
            frame_count: 32,
        });

        assert!(out_l.iter().all(|&s| s == 0.0));
        assert!(out_r.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn monitoring_enabled_while_recording_mixes_live_mic_into_output() {
        let params = Arc::new(RenderParams::new(120));
        params.is_recording.store(true, Ordering::Release);
        params.monitoring_enabled.store(true, Ordering::Release);
        let (mut engine, _beat_rx) = engine_with_params(params, 48_000);

        let (producer, _consumer) = ring_channel(8192);
        engine.set_recorder(Some(producer));

        let mut out_l = vec![0.0; 32];
        let mut out_r = vec![0.0; 32];
        let in_l = vec![1.0; 32];
        let in_r = vec![1.0; 32];
        engine.process_block(RenderBlock {
            output_left: &mut out_l,
            output_right: &mut out_r,
            input_left: &in_l,
            input_right: &in_r,
            frame_count: 32,
        });

        assert!(out_l.iter().all(|&s| s == 1.0));
        assert!(out_r.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn tolerates_missing_input_block_while_recording() {
        let params = Arc::new(RenderParams::new(120));
        params.is_playing.store(true, Ordering::Release);
        params.is_recording.store(true, Ordering::Release);
        let (mut engine, _beat_rx) = engine_with_params(params, 48_000);

        let (producer, _consumer) = ring_channel(8192);
        engine.set_recorder(Some(producer));

        let mut out_l = vec![0.0; 64];
        let mut out_r = vec![0.0; 64];
        engine.process_block(RenderBlock {
            output_left: &mut out_l,
            output_right: &mut out_r,
            input_left: &[],
            input_right: &[],
            frame_count: 64,
        });
        // Should not panic; dropped_samples tracks only ring overruns, not
        // missing input.
        assert_eq!(engine.recorder_dropped_samples(), 0);
    }

    #[test]
    fn recording_block_writes_exactly_two_samples_per_frame() {
        // A block of n frames must produce exactly 2n ring writes (stereo
        // interleaving) whenever recording spans the whole block.
        let params = Arc::new(RenderParams::new(120));
        params.is_playing.store(true, Ordering::Release);
        params.is_recording.store(true, Ordering::Release);
        let (mut engine, _beat_rx) = engine_with_params(params, 48_000);

        let (producer, mut consumer) = ring_channel(8192);
        engine.set_recorder(Some(producer));

        let frame_count = 256;
        let mut out_l = vec![0.0; frame_count];
        let mut out_r = vec![0.0; frame_count];
        engine.process_block(RenderBlock {
            output_left: &mut out_l,
            output_right: &mut out_r,
            input_left: &[],
            input_right: &[],
            frame_count,
        });

        assert_eq!(consumer.available_read(), frame_count * 2);
    }

    #[test]
    fn on_disk_alignment_matches_latency_compensated_click_and_mic_impulse() {
        // A mic impulse recorded coincident with a monitored click onset
        // must land on the same sample index as the latency-compensated
        // click in the file.
        let params = Arc::new(RenderParams::new(1)); // one click for the whole test
        params.is_playing.store(true, Ordering::Release);
        params.is_recording.store(true, Ordering::Release);

        let (beat_tx, _beat_rx) = rtrb::RingBuffer::<BeatEvent>::new(64);
        let click_pattern = Arc::new(ClickPattern::new(4));
        click_pattern.set_buffers(crate::click::ClickBuffers {
            normal: vec![1.0],
            accent: Vec::new(),
        });

        let sample_rate = 48_000u32;
        let latency_frames = 16usize;
        let input_latency_seconds = latency_frames as f32 / sample_rate as f32;
        let block_size = 8usize;

        let mut engine =
            RenderEngine::new(sample_rate, click_pattern, params, input_latency_seconds, beat_tx, block_size);

        let (producer, mut consumer) = ring_channel(4096);
        engine.set_recorder(Some(producer));

        // The click fires at absolute sample 0 (block 0, offset 0); the
        // recorded, latency-compensated click for it only emerges `latency`
        // samples into the continuous record stream. A mic impulse at the
        // same absolute sample should sum with it there, not at sample 0.
        let mic_impulse_block = 2; // block_size * 2 == latency_frames
        let num_blocks = 4;
        let mut recorded = Vec::new();
        for block_idx in 0..num_blocks {
            let mut out_l = vec![0.0; block_size];
            let mut out_r = vec![0.0; block_size];
            let mut in_l = vec![0.0; block_size];
            let in_r = vec![0.0; block_size];
            if block_idx == mic_impulse_block {
                in_l[0] = 1.0;
            }
            engine.process_block(RenderBlock {
                output_left: &mut out_l,
                output_right: &mut out_r,
                input_left: &in_l,
                input_right: &in_r,
                frame_count: block_size,
            });
            let mut scratch = vec![0.0; block_size * 2];
            let read = consumer.read_into(&mut scratch);
            recorded.extend_from_slice(&scratch[..read]);
        }

        let left: Vec<f32> = recorded.chunks(2).map(|frame| frame[0]).collect();
        for (i, &sample) in left.iter().enumerate() {
            if i == latency_frames {
                assert_eq!(sample, 2.0, "click and mic impulse should sum at the aligned sample");
            } else {
                assert_eq!(sample, 0.0, "unexpected energy at sample {i}");
            }
        }
    }

    #[test]
    fn overrun_is_counted_when_writer_stalls() {
        let params = Arc::new(RenderParams::new(120));
        params.is_playing.store(true, Ordering::Release);
        params.is_recording.store(true, Ordering::Release);
        let (mut engine, _beat_rx) = engine_with_params(params, 48_000);

        let (producer, _consumer) = ring_channel(16); // tiny, forces overrun
        engine.set_recorder(Some(producer));

        let mut out_l = vec![0.0; 1024];
        let mut out_r = vec![0.0; 1024];
        engine.process_block(RenderBlock {
            output_left: &mut out_l,
            output_right: &mut out_r,
            input_left: &[],
            input_right: &[],
            frame_count: 1024,
        });

        assert!(engine.recorder_dropped_samples() > 0);
    }
}
