//! Error types for flowsteer

use thiserror::Error;

/// Fault raised by a telemetry source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// One item (or one top-level collection) has no usable data
    #[error("telemetry unavailable: {what}")]
    Unavailable {
        /// What could not be read
        what: String,
    },

    /// The telemetry source itself is gone
    #[error("telemetry source unreachable: {0}")]
    Unreachable(String),
}

impl TelemetryError {
    /// Per-item or structural fault for `what`
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable { what: what.into() }
    }

    /// Only loss of the source terminates a step
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Result of a single telemetry call
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// flowsteer error type
#[derive(Error, Debug)]
pub enum TeError {
    /// Fatal telemetry fault
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Observation violates its layout or bounds
    #[error("invalid observation: {0}")]
    InvalidObservation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TeError {
    /// Whether the decision loop must stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Telemetry(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Result type for flowsteer
pub type TeResult<T> = Result<T, TeError>;
