//! Runtime configuration for the render pipeline.
//!
//! Loaded from a JSON file at startup, enabling tuning of buffer sizing and
//! the writer's idle-poll cadence without recompilation. Falls back to
//! defaults whenever the file is missing or malformed, so a missing config
//! never prevents the engine from starting.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ring_buffer: RingBufferConfig,
    pub writer: WriterConfig,
    pub latency: LatencyConfig,
}

/// Sizing for the render-thread-to-writer-thread SPSC transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingBufferConfig {
    /// Capacity expressed in seconds of stereo audio at the active sample
    /// rate, so capacity scales with whatever device sample rate is opened.
    pub capacity_seconds: f32,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            capacity_seconds: 5.0,
        }
    }
}

/// File writer thread tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// How long the writer thread sleeps when it finds the ring empty.
    pub idle_sleep_micros: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            idle_sleep_micros: 1000,
        }
    }
}

/// Latency-compensation delay line defaults, used when the backend cannot
/// report a measured round-trip latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    pub default_input_latency_seconds: f32,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            default_input_latency_seconds: 0.0,
        }
    }
}

impl Default for EngineConfig {
    /// Default configuration values (fallback if config file not found).
    fn default() -> Self {
        Self {
            ring_buffer: RingBufferConfig::default(),
            writer: WriterConfig::default(),
            latency: LatencyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    ///
    /// Returns the parsed config on success. If the file can't be read or
    /// doesn't parse, logs a warning and falls back to defaults rather than
    /// failing engine startup.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration for non-Android platforms, from the conventional
    /// assets location.
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/engine_config.json")
    }

    /// Load configuration on Android. Asset-bundle access requires going
    /// through the host bridge, which is out of scope for this crate, so
    /// this always returns defaults.
    #[cfg(target_os = "android")]
    pub fn load_android() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }
}
