//! Error types for the spectrophotometer workspace.
//!
//! `SpectroError` is the single error type returned by the library crates. It
//! groups failures the way the acquisition pipeline has to react to them:
//!
//! - **`Hardware`**: serial write/read failure or acquisition-card failure. Never
//!   retried; the current sweep or step aborts and already-written rows stay on disk.
//! - **`StallTimeout`**: a bounded poll (actuator idle, sensor state) ran out of
//!   time. Replaces the unbounded busy-wait of older control scripts.
//! - **`DivisionByZero`** / **`Numeric`**: absorbance or fit arithmetic that has no
//!   finite answer.
//! - **`Configuration`** / **`InvalidCalibration`**: rejected before any motion starts.
//! - **`Storage`** / **`Io`** / **`Config`**: export sink, filesystem and config parsing.
//!
//! Drivers and capability traits speak `anyhow::Result` and are mapped into
//! `SpectroError::Hardware` at the experiment layer with [`SpectroError::hardware`].

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a driver-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device did not come up (port open, wake sequence).
    Initialization,
    /// Serial link or acquisition-card communication failed.
    Communication,
    /// Device reported a fault (GRBL alarm, DAQ task error).
    Hardware,
    /// Device did not answer in time.
    Timeout,
    /// Caller passed a value the device cannot accept.
    InvalidParameter,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Error raised by a concrete driver (real or simulated).
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver identifier, e.g. `"grbl"` or `"mock_photodiode"`.
    pub driver_type: String,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DriverError {
    /// Build a driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the workspace error type.
pub type SpectroResult<T> = std::result::Result<T, SpectroError>;

/// Primary error type for acquisition and processing.
#[derive(Error, Debug)]
pub enum SpectroError {
    /// Configuration file or environment could not be parsed.
    ///
    /// **Recovery Strategy**: Abort startup, fix the TOML file.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration or request parsed correctly but is semantically invalid
    /// (wavelength range outside travel, step that yields zero measurements).
    ///
    /// Always detected before the first motion command is sent.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The inverse wavelength mapping produced a negative actuator position.
    ///
    /// Actuator travel is measured from the limit switch and is never negative,
    /// so this indicates a calibration sign error rather than a reachable point.
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    /// Serial link, motion controller or acquisition card failed.
    ///
    /// **Recovery Strategy**: None at this layer. The sweep aborts; partial data
    /// already persisted by the export sink remains usable.
    #[error("Hardware I/O error: {0}")]
    Hardware(String),

    /// A bounded poll expired before the awaited condition became true.
    #[error("{what} did not complete within {waited:?}")]
    StallTimeout {
        /// What was being waited for (e.g. "screw axis idle").
        what: String,
        /// Total time spent polling.
        waited: Duration,
    },

    /// Absorbance requested with a zero (or vanishing) sample voltage.
    #[error("Division by zero: sample voltage {sample_voltage} at point {index}")]
    DivisionByZero {
        /// Index of the offending point in its series.
        index: usize,
        /// The sample voltage that could not be divided by.
        sample_voltage: f64,
    },

    /// Degenerate numeric input (empty trace, singular fit, length mismatch).
    #[error("Numeric error: {0}")]
    Numeric(String),

    /// Export sink failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Functionality that is not compiled into this build.
    #[error("Feature '{0}' is not available in this build")]
    FeatureNotEnabled(String),

    /// A driver-level error surfaced without being wrapped by a capability call.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl SpectroError {
    /// Wrap an `anyhow` error from a capability call as a hardware failure,
    /// keeping the full context chain in the message.
    pub fn hardware(context: &str, err: anyhow::Error) -> Self {
        SpectroError::Hardware(format!("{}: {:#}", context, err))
    }

    /// Whether the error came from the physical devices rather than from
    /// configuration or arithmetic.
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            SpectroError::Hardware(_) | SpectroError::StallTimeout { .. } | SpectroError::Driver(_)
        )
    }
}

impl From<figment::Error> for SpectroError {
    fn from(err: figment::Error) -> Self {
        SpectroError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display_includes_kind() {
        let err = DriverError::new("grbl", DriverErrorKind::Timeout, "no ok after G0");
        assert_eq!(err.to_string(), "Driver 'grbl' timeout error: no ok after G0");
    }

    #[test]
    fn hardware_keeps_context_chain() {
        let inner = anyhow::anyhow!("port closed").context("status query failed");
        let err = SpectroError::hardware("screw idle poll", inner);
        let msg = err.to_string();
        assert!(msg.contains("screw idle poll"));
        assert!(msg.contains("status query failed"));
        assert!(msg.contains("port closed"));
        assert!(err.is_hardware());
    }

    #[test]
    fn stall_timeout_is_hardware_class() {
        let err = SpectroError::StallTimeout {
            what: "screw axis idle".into(),
            waited: Duration::from_secs(5),
        };
        assert!(err.is_hardware());
        assert!(!SpectroError::Numeric("empty".into()).is_hardware());
    }
}
