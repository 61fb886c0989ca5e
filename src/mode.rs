//! Operating mode controller
//!
//! Holds the process-wide flags that the telemetry loop reads on every tick.
//! Each control operation clears the flag of the opposite mode so the pair
//! stays logically exclusive even though they are stored independently.

use crate::error::MonitorError;
use crate::types::{ModeSnapshot, OperatingMode};
use serde::{Deserialize, Serialize};

/// Default stabilization target (bpm)
pub const DEFAULT_STABILIZATION_TARGET: i32 = 75;

/// Mode flags and the stabilization target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeController {
    alert_active: bool,
    stabilizing: bool,
    target: i32,
    scrub_in_verified: bool,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(DEFAULT_STABILIZATION_TARGET)
    }
}

impl ModeController {
    /// Create a controller in normal mode with the given target
    pub fn new(target: i32) -> Self {
        Self {
            alert_active: false,
            stabilizing: false,
            target,
            scrub_in_verified: false,
        }
    }

    /// Start automated stabilization
    pub fn stabilize(&mut self) {
        self.stabilizing = true;
        self.alert_active = false;
    }

    /// Raise a code blue
    pub fn code_blue(&mut self) {
        self.alert_active = true;
        self.stabilizing = false;
    }

    /// Return every flag to its startup value. The target is left untouched.
    pub fn recalibrate(&mut self) {
        self.alert_active = false;
        self.stabilizing = false;
        self.scrub_in_verified = false;
    }

    /// Compare a presented signature against the expected one
    pub fn scrub_in(&mut self, presented: Option<&str>, expected: &str) -> Result<(), MonitorError> {
        if presented == Some(expected) {
            self.scrub_in_verified = true;
            Ok(())
        } else {
            Err(MonitorError::BiometricMismatch)
        }
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        ModeSnapshot {
            alert_active: self.alert_active,
            stabilizing: self.stabilizing,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        OperatingMode::from_flags(self.alert_active, self.stabilizing)
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    pub fn is_scrubbed_in(&self) -> bool {
        self.scrub_in_verified
    }

    /// Set both flags directly. Only reachable from tests.
    #[cfg(test)]
    pub(crate) fn force_flags(&mut self, alert_active: bool, stabilizing: bool) {
        self.alert_active = alert_active;
        self.stabilizing = stabilizing;
    }
}
