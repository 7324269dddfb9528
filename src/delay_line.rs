//! Fixed-latency delay line used to time-align the click track against the
//! captured microphone signal before mixing into the recording.
//!
//! The input path (microphone) reaches the render callback with some
//! round-trip latency `L` (in samples) relative to the output path (click).
//! Delaying the click by `L` samples before mixing brings both into phase
//! in the recorded file. Modeled as a fixed-capacity ring of `2*L` stereo
//! samples: write one block, read back the block pushed exactly `L` frames
//! earlier, with silence substituted during warm-up before the line has
//! accumulated `L` samples of history.

use std::collections::VecDeque;

/// Stereo delay line with a fixed target latency, expressed in frames.
pub struct LatencyDelayLine {
    latency_frames: usize,
    left: VecDeque<f32>,
    right: VecDeque<f32>,
}

impl LatencyDelayLine {
    /// `latency_seconds` is rounded to the nearest sample at `sample_rate`.
    pub fn new(latency_seconds: f32, sample_rate: u32) -> Self {
        let latency_frames = (latency_seconds * sample_rate as f32).round() as usize;
        Self::with_frames(latency_frames)
    }

    pub fn with_frames(latency_frames: usize) -> Self {
        let capacity = latency_frames.saturating_mul(2).max(1);
        Self {
            latency_frames,
            left: VecDeque::with_capacity(capacity),
            right: VecDeque::with_capacity(capacity),
        }
    }

    pub fn latency_frames(&self) -> usize {
        self.latency_frames
    }

    /// True once the line holds at least `latency_frames` samples of
    /// history and has stopped emitting warm-up silence.
    pub fn is_warmed_up(&self) -> bool {
        self.left.len() >= self.latency_frames
    }

    /// Push one block of non-interleaved stereo samples (`left`/`right` are
    /// equal-length slices for the same `n` frames).
    pub fn push_block(&mut self, left: &[f32], right: &[f32]) {
        debug_assert_eq!(left.len(), right.len());
        self.left.extend(left.iter().copied());
        self.right.extend(right.iter().copied());
    }

    /// Read back `n` frames delayed by `latency_frames`, writing into
    /// `out_left`/`out_right`. Emits silence for any frame not yet available
    /// (during warm-up), and never grows the line's retained history beyond
    /// `2 * latency_frames`.
    pub fn read_block(&mut self, out_left: &mut [f32], out_right: &mut [f32]) {
        debug_assert_eq!(out_left.len(), out_right.len());
        for i in 0..out_left.len() {
            if self.left.len() > self.latency_frames {
                out_left[i] = self.left.pop_front().unwrap_or(0.0);
                out_right[i] = self.right.pop_front().unwrap_or(0.0);
            } else {
                out_left[i] = 0.0;
                out_right[i] = 0.0;
            }
        }
    }
}
