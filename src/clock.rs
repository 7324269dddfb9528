//! Sample-accurate timing: converts a running sample position into beat
//! index and beat-relative phase.
//!
//! A clock object the render engine advances by a whole block at a time,
//! exposing the position-to-beat math as pure functions so `ClickVoice` can
//! evaluate it once per frame without touching shared state.

/// Tracks elapsed samples since playback started and converts that position
/// into beat index / beat phase at the current tempo.
///
/// `position_samples` is only ever touched by the render thread, so it is a
/// plain `f64`, not an atomic. Tempo itself is not state the clock owns: the
/// render engine reads `RenderParams::bpm` once per block and passes that
/// snapshot into the `samples_per_beat`/`beat_index`/`beat_phase` functions
/// below, so a tempo change can never tear mid-block.
pub struct SampleClock {
    sample_rate: f64,
    position_samples: f64,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            position_samples: 0.0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    /// Current playback position, in samples since start.
    pub fn position(&self) -> f64 {
        self.position_samples
    }

    /// Advance the clock by `frames` samples. Called once per rendered block.
    pub fn advance(&mut self, frames: u64) {
        self.position_samples += frames as f64;
    }

    /// Samples per beat at the given tempo and sample rate.
    pub fn samples_per_beat(sample_rate: f64, bpm: u32) -> f64 {
        sample_rate * 60.0 / bpm as f64
    }

    /// Beat index containing sample position `p` (0-based, floor division).
    pub fn beat_index(p: f64, samples_per_beat: f64) -> i64 {
        (p / samples_per_beat).floor() as i64
    }

    /// Position within the current beat, in `[0, samples_per_beat)`.
    pub fn beat_phase(p: f64, samples_per_beat: f64) -> f64 {
        p - (p / samples_per_beat).floor() * samples_per_beat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_per_beat_matches_known_values() {
        assert_eq!(SampleClock::samples_per_beat(48_000.0, 120), 24_000.0);
        assert_eq!(SampleClock::samples_per_beat(48_000.0, 60), 48_000.0);
        assert_eq!(SampleClock::samples_per_beat(48_000.0, 240), 12_000.0);
        assert_eq!(SampleClock::samples_per_beat(44_100.0, 100), 26_460.0);
    }

    #[test]
    fn beat_index_floors_correctly() {
        let spb = SampleClock::samples_per_beat(48_000.0, 120);
        assert_eq!(SampleClock::beat_index(0.0, spb), 0);
        assert_eq!(SampleClock::beat_index(23_999.0, spb), 0);
        assert_eq!(SampleClock::beat_index(24_000.0, spb), 1);
        assert_eq!(SampleClock::beat_index(47_999.0, spb), 1);
        assert_eq!(SampleClock::beat_index(48_000.0, spb), 2);
    }

    #[test]
    fn beat_phase_wraps_at_boundary() {
        let spb = SampleClock::samples_per_beat(48_000.0, 120);
        assert_eq!(SampleClock::beat_phase(0.0, spb), 0.0);
        assert_eq!(SampleClock::beat_phase(100.0, spb), 100.0);
        assert_eq!(SampleClock::beat_phase(24_000.0, spb), 0.0);
        assert_eq!(SampleClock::beat_phase(24_100.0, spb), 100.0);
    }

    #[test]
    fn advance_accumulates_position() {
        let mut clock = SampleClock::new(48_000);
        clock.advance(512);
        clock.advance(512);
        assert_eq!(clock.position(), 1024.0);
    }

    #[test]
    fn tempo_change_applies_at_exact_block_boundary() {
        // A tempo change from 120 to 180 bpm exactly at frame 24000. The
        // clock itself does not buffer the old tempo across
        // a boundary; it is the render engine's per-block snapshot discipline
        // that guarantees atomicity, so here we only check the raw formula
        // produces distinct beat grids before/after the switch.
        let spb_before = SampleClock::samples_per_beat(48_000.0, 120);
        let spb_after = SampleClock::samples_per_beat(48_000.0, 180);
        assert_eq!(SampleClock::beat_index(23_999.0, spb_before), 0);
        assert_eq!(SampleClock::beat_index(24_000.0, spb_after), 1);
    }
}
