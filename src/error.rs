// Error types for the metronome/recording engine.
//
// Structured error handling with stable numeric codes: every error carries a
// code and a human message so a host layer (FFI, CLI, HTTP) can report it
// uniformly.

use log::error;
use std::fmt;

/// Standard way to get an error code and message from a custom error type.
pub trait ErrorCode {
    /// Numeric error code, stable across versions.
    fn code(&self) -> i32;

    /// Human-readable error message.
    fn message(&self) -> String;
}

/// Error code constants for the engine, grouped for a future FFI boundary.
///
/// Error code range: 2001-2010.
pub struct EngineErrorCodes;

impl EngineErrorCodes {
    pub const INVALID_STATE: i32 = 2001;
    pub const CONFIGURATION_FAILED: i32 = 2002;
    pub const PERMISSION_DENIED: i32 = 2003;
    pub const DEVICE_FAILURE: i32 = 2004;
    pub const IO_ERROR: i32 = 2005;
    pub const OVERRUN: i32 = 2006;
}

/// Engine-level errors surfaced to the host.
///
/// The render thread never constructs or propagates these: it tolerates
/// failures locally (silence substitution, dropped-sample counters) and only
/// the controller, backends, and the file writer return them.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// An operation was requested in a state that does not support it
    /// (e.g. `stop_recording` while not recording).
    InvalidState { reason: String },

    /// Device or format configuration could not be established.
    ConfigurationFailed { reason: String },

    /// Microphone permission was denied by the host platform.
    PermissionDenied,

    /// The audio device reported a failure.
    DeviceFailure { code: i32, context: String },

    /// Reading or writing the recording file failed.
    IoError { reason: String },

    /// The ring buffer overran and dropped one or more samples.
    Overrun { dropped_samples: u64 },
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::InvalidState { .. } => EngineErrorCodes::INVALID_STATE,
            EngineError::ConfigurationFailed { .. } => EngineErrorCodes::CONFIGURATION_FAILED,
            EngineError::PermissionDenied => EngineErrorCodes::PERMISSION_DENIED,
            EngineError::DeviceFailure { .. } => EngineErrorCodes::DEVICE_FAILURE,
            EngineError::IoError { .. } => EngineErrorCodes::IO_ERROR,
            EngineError::Overrun { .. } => EngineErrorCodes::OVERRUN,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::InvalidState { reason } => format!("Invalid state: {}", reason),
            EngineError::ConfigurationFailed { reason } => {
                format!("Configuration failed: {}", reason)
            }
            EngineError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            EngineError::DeviceFailure { code, context } => {
                format!("Device error {} in {}", code, context)
            }
            EngineError::IoError { reason } => format!("I/O error: {}", reason),
            EngineError::Overrun { dropped_samples } => {
                format!("Ring buffer overrun, dropped {} samples", dropped_samples)
            }
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineError::{:?} (code {}): {}", self, self.code(), self.message())
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::IoError {
            reason: err.to_string(),
        }
    }
}

impl From<hound::Error> for EngineError {
    fn from(err: hound::Error) -> Self {
        EngineError::IoError {
            reason: err.to_string(),
        }
    }
}

/// Log an engine error with structured context.
pub fn log_engine_error(err: &EngineError, context: &str) {
    error!(
        "Engine error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}
