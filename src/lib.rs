//! Metronome Engine - sample-accurate click and recording core.
//!
//! Real-time-safe render path (no allocation, no locks, no blocking I/O on
//! the audio callback) driving a cross-platform audio backend, with a
//! host-facing `Controller`/`api` surface for transport, tempo, and
//! recording control.

// Module declarations
pub mod api;
pub mod backend;
pub mod click;
pub mod clock;
pub mod config;
pub mod controller;
pub mod delay_line;
pub mod error;
pub mod render;
pub mod ring_buffer;
pub mod telemetry;
pub mod writer;

// Re-exports for convenience
pub use api::*;

/// Initialize structured logging. Safe to call more than once; only the
/// first call installs a subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_module_structure() {
        // Verify all modules are accessible; this ensures the crate
        // compiles with the expected module hierarchy.
    }
}
