//! Platform audio I/O adapters that drive `RenderEngine::process_block` from
//! a real device callback.
//!
//! A shared trait plus one implementation per platform (`cpal` for desktop,
//! `oboe` for Android), with a `desktop_stub` used for deterministic tests
//! and CLI tooling without real hardware.

use crate::click::{BeatEvent, ClickPattern};
use crate::error::EngineError;
use crate::ring_buffer::RingProducer;
use std::sync::Arc;
use std::time::Instant;

use super::render::RenderParams;

/// Context handed to a backend's `start`, bundling the shared state the
/// render engine it constructs needs to read every block.
pub struct EngineStartContext {
    pub click_pattern: Arc<ClickPattern>,
    pub params: Arc<RenderParams>,
    pub input_latency_seconds: f32,
    pub beat_tx: rtrb::Producer<BeatEvent>,
}

/// Sample rate and reported round-trip latency of the opened stream,
/// returned by a successful `start`.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub measured_input_latency_seconds: f32,
}

/// Trait implemented by platform-specific audio backends.
///
/// Each backend owns its device stream(s) on a dedicated thread (device
/// streams generally aren't `Send`) and constructs exactly one
/// `RenderEngine` to drive from its callback.
pub trait AudioBackend: Send + Sync {
    fn start(&self, ctx: EngineStartContext) -> Result<StreamInfo, EngineError>;
    fn stop(&self) -> Result<(), EngineError>;

    /// Hand a freshly-constructed ring producer to the render thread so it
    /// starts mixing into the recording on the next block. Returns without
    /// error even if the backend isn't running; the producer is simply
    /// dropped in that case.
    fn attach_recorder(&self, producer: RingProducer) -> Result<(), EngineError>;

    /// Detach the current recorder (if any) and return how many samples it
    /// dropped over its lifetime due to the writer thread falling behind.
    fn detach_recorder(&self) -> Result<u64, EngineError>;

    /// Re-size the click-compensation delay line from a freshly measured
    /// input latency. Called by the controller when arming a recording,
    /// once the backend has reported its actual latency via `StreamInfo`.
    fn set_input_latency(&self, input_latency_seconds: f32) -> Result<(), EngineError>;
}

/// Monotonic time source used for telemetry timestamps, abstracted so tests
/// can supply a deterministic clock.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(target_os = "android")]
mod oboe_backend;
#[cfg(target_os = "android")]
pub use oboe_backend::OboeBackend;

#[cfg(not(target_os = "android"))]
mod cpal_backend;
#[cfg(not(target_os = "android"))]
pub use cpal_backend::CpalBackend;

mod desktop_stub;
pub use desktop_stub::{DesktopStubBackend, StubTimeSource};
