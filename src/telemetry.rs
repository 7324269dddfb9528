//! Lightweight event hub for host-facing diagnostics: engine lifecycle,
//! tempo changes, and ring-buffer overruns.
//!
//! A single lazy `broadcast::Sender` channel. Render-thread code never
//! touches this directly: it posts through the beat-event SPSC into a drain
//! task, which is the only thing that calls `TelemetryHub::publish`.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Host-facing engine events, logged structurally and published to
/// subscribers (the beat-event stream is a separate channel; this one is
/// for state transitions and diagnostics).
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    EngineStarted { sample_rate: u32 },
    EngineStopped,
    TempoChanged { bpm: u32 },
    RecordingStarted,
    RecordingStopped { dropped_samples: u64 },
    Overrun { dropped_samples: u64 },
}

pub struct TelemetryHub {
    tx: broadcast::Sender<TelemetryEvent>,
}

impl TelemetryHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, logging it structurally. Dropped if there are no
    /// subscribers — that's expected and not an error.
    pub fn publish(&self, event: TelemetryEvent) {
        log::info!("[telemetry] {:?}", event);
        let _ = self.tx.send(event);
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new()
    }
}
