//! Click generation: renders the metronome's audible tick from pre-loaded
//! sample buffers, selecting the accent buffer on the first beat of each bar.
//!
//! Sample buffers (normal + accent) are arbitrary host-supplied PCM rather
//! than a synthesized waveform, so the host can load its own click sound.
//!
//! `ClickPattern` is shared between the host thread (which loads buffers and
//! changes the time signature) and the render thread (which reads both
//! every block) via `Arc<ClickPattern>`, so every field uses interior
//! mutability rather than `&mut self`.

use crate::clock::SampleClock;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

/// Decoded click sample buffers, mono, at the engine's sample rate. Replaced
/// wholesale by the host via `ClickPattern::set_buffers`.
#[derive(Debug, Default, Clone)]
pub struct ClickBuffers {
    pub normal: Vec<f32>,
    pub accent: Vec<f32>,
}

/// Beat event posted once per beat boundary.
///
/// `sample_position` is the exact clock position (in samples, from playback
/// start) of the beat boundary that fired, used to build the recording
/// summary's `timestamps` list. `beat_in_bar` is the beat's position within
/// its bar (`0` is the downbeat/accent beat).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    pub sample_position: u64,
    pub beat_in_bar: u32,
}

/// Holds the current time signature and click sample buffers. Buffers are
/// stored behind `ArcSwap` rather than a `Mutex` because the render thread
/// reads them every block and must never block on a host-thread lock;
/// `ArcSwap::load` is wait-free and the host's `set_buffers` is a single
/// atomic pointer swap.
pub struct ClickPattern {
    buffers: ArcSwap<ClickBuffers>,
    time_signature: AtomicU32,
    last_beat_fired: AtomicI64,
}

/// Samples within a beat boundary where a fresh beat-event is still
/// considered "just started" and can re-trigger the click voice; guards
/// against re-triggering mid-beat due to floating point jitter at the
/// boundary.
const BEAT_GUARD_SAMPLES: f64 = 100.0;

impl ClickPattern {
    pub fn new(time_signature: u32) -> Self {
        Self {
            buffers: ArcSwap::from_pointee(ClickBuffers::default()),
            time_signature: AtomicU32::new(time_signature.max(1)),
            last_beat_fired: AtomicI64::new(-1),
        }
    }

    pub fn time_signature(&self) -> u32 {
        self.time_signature.load(Ordering::Acquire)
    }

    pub fn set_time_signature(&self, time_signature: u32) {
        self.time_signature.store(time_signature.max(1), Ordering::Release);
    }

    /// Replace the click sample buffers. Callable from the host thread while
    /// the render thread is concurrently reading via `buffers()`.
    pub fn set_buffers(&self, buffers: ClickBuffers) {
        self.buffers.store(Arc::new(buffers));
    }

    pub fn buffers(&self) -> Arc<ClickBuffers> {
        self.buffers.load_full()
    }

    /// Reset beat-retrigger state, e.g. on transport stop/seek.
    pub fn reset(&self) {
        self.last_beat_fired.store(-1, Ordering::Release);
    }
}

/// Stateless-per-block click renderer: recomputes click membership from the
/// clock each frame rather than scheduling ahead, so correctness never
/// depends on carried-over state across blocks (beyond `last_beat_fired`,
/// used only to de-duplicate beat-event emission).
pub struct ClickVoice;

impl ClickVoice {
    /// Render `frame_count` frames of click audio starting at clock position
    /// `p0`, mixing into `out_left`/`out_right` (added, not overwritten, so
    /// callers can layer the click on top of other material). Emits a
    /// `BeatEvent` the first frame a new beat boundary is crossed within
    /// this block.
    pub fn render(
        pattern: &ClickPattern,
        clock_sample_rate: f64,
        bpm: u32,
        p0: f64,
        frame_count: usize,
        out_left: &mut [f32],
        out_right: &mut [f32],
        mut on_beat: impl FnMut(BeatEvent),
    ) {
        debug_assert_eq!(out_left.len(), frame_count);
        debug_assert_eq!(out_right.len(), frame_count);

        let buffers = pattern.buffers();
        let samples_per_beat = SampleClock::samples_per_beat(clock_sample_rate, bpm);
        let time_signature = pattern.time_signature();

        for i in 0..frame_count {
            let p = p0 + i as f64;
            let phase = SampleClock::beat_phase(p, samples_per_beat);
            let beat_index = SampleClock::beat_index(p, samples_per_beat);

            let last_fired = pattern.last_beat_fired.load(Ordering::Acquire);
            if phase < BEAT_GUARD_SAMPLES && beat_index != last_fired {
                pattern.last_beat_fired.store(beat_index, Ordering::Release);
                let beat_in_bar = (beat_index.rem_euclid(time_signature as i64)) as u32;
                let sample_position = (beat_index as f64 * samples_per_beat).round() as u64;
                on_beat(BeatEvent { sample_position, beat_in_bar });
            }

            let is_accent = time_signature >= 2
                && beat_index.rem_euclid(time_signature as i64) == 0
                && !buffers.accent.is_empty();

            let source = if is_accent { &buffers.accent } else { &buffers.normal };
            let sample = if !source.is_empty() {
                let offset = phase.floor() as usize;
                source.get(offset).copied().unwrap_or(0.0)
            } else {
                0.0
            };

            out_left[i] += sample;
            out_right[i] += sample;
        }
    }
}
