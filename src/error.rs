//! Error types for Synheart ICU

use thiserror::Error;

/// Errors that can occur while serving the monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Biometric Mismatch")]
    BiometricMismatch,

    #[error("Clinical advisor is not configured")]
    AdvisorUnavailable,

    #[error("Clinical advisor failed: {0}")]
    Advisor(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            MonitorError::Validation(_) => "VALIDATION_ERROR",
            MonitorError::JsonError(_) => "JSON_ERROR",
            MonitorError::BiometricMismatch => "BIOMETRIC_MISMATCH",
            MonitorError::AdvisorUnavailable => "ADVISOR_UNAVAILABLE",
            MonitorError::Advisor(_) => "ADVISOR_ERROR",
            MonitorError::Transport(_) => "TRANSPORT_ERROR",
            MonitorError::Config(_) => "CONFIG_ERROR",
            MonitorError::Io(_) => "IO_ERROR",
        }
    }
}
