//! Monitor configuration
//!
//! Defaults reproduce the reference dashboard backend. Environment variables
//! override them, and the CLI overrides the environment.

use crate::error::MonitorError;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::mode::DEFAULT_STABILIZATION_TARGET;
use crate::telemetry::INITIAL_CURSOR_BPM;
use std::net::SocketAddr;
use std::time::Duration;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Default delay between ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);

/// Signature accepted by the scrub-in check
pub const DEFAULT_NEURAL_SIGNATURE: &str = "VERIFY_THORNE_01";

/// Default generative model for the clinical advisor
pub const DEFAULT_ADVISOR_MODEL: &str = "gemini-1.5-flash";

/// Runtime configuration for the monitor and its server
#[derive(Clone)]
pub struct MonitorConfig {
    pub bind_addr: SocketAddr,
    pub tick_interval: Duration,
    pub history_capacity: usize,
    pub stabilization_target: i32,
    pub initial_cursor: i32,
    pub neural_signature: String,
    pub advisor_model: String,
    pub advisor_api_key: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            tick_interval: DEFAULT_TICK_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            stabilization_target: DEFAULT_STABILIZATION_TARGET,
            initial_cursor: INITIAL_CURSOR_BPM,
            neural_signature: DEFAULT_NEURAL_SIGNATURE.to_string(),
            advisor_model: DEFAULT_ADVISOR_MODEL.to_string(),
            advisor_api_key: None,
        }
    }
}

// Keeps the API key out of logs
impl std::fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("bind_addr", &self.bind_addr)
            .field("tick_interval", &self.tick_interval)
            .field("history_capacity", &self.history_capacity)
            .field("stabilization_target", &self.stabilization_target)
            .field("initial_cursor", &self.initial_cursor)
            .field("advisor_model", &self.advisor_model)
            .field("advisor_api_key", &self.advisor_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MonitorConfig {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self, MonitorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MonitorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("ICU_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| MonitorError::Config(format!("ICU_BIND_ADDR={addr}: {e}")))?;
        }
        if let Some(ms) = lookup("ICU_TICK_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|e| MonitorError::Config(format!("ICU_TICK_MS={ms}: {e}")))?;
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(sig) = lookup("ICU_NEURAL_SIG") {
            config.neural_signature = sig;
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            config.advisor_model = model;
        }
        config.advisor_api_key = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Reject values the telemetry loop cannot run with
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.tick_interval.is_zero() {
            return Err(MonitorError::Config("tick interval must be positive".to_string()));
        }
        if self.history_capacity == 0 {
            return Err(MonitorError::Config("history capacity must be positive".to_string()));
        }
        if self.neural_signature.is_empty() {
            return Err(MonitorError::Config("neural signature must not be empty".to_string()));
        }
        Ok(())
    }
}
