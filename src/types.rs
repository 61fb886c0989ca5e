//! Core types for the Synheart ICU monitor
//!
//! This module defines the data structures shared between the telemetry loop,
//! the control operations and the HTTP surface.

use serde::{Deserialize, Serialize};

/// Side length of the cosmetic signal map attached to every sample
pub const HEATMAP_SIZE: usize = 8;

/// Resting reference drawn as a ghost line on the dashboard (bpm)
pub const BASELINE_GHOST_BPM: i32 = 72;

/// Operating mode governing sample computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    Normal,
    Alert,
    Stabilizing,
}

impl OperatingMode {
    /// Resolve the mode from the two independent flags.
    ///
    /// Stabilizing wins when both flags are set.
    pub fn from_flags(alert_active: bool, stabilizing: bool) -> Self {
        if stabilizing {
            OperatingMode::Stabilizing
        } else if alert_active {
            OperatingMode::Alert
        } else {
            OperatingMode::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Normal => "normal",
            OperatingMode::Alert => "alert",
            OperatingMode::Stabilizing => "stabilizing",
        }
    }
}

/// Point-in-time view of the mode flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSnapshot {
    /// Code blue is active
    pub alert_active: bool,
    /// Automated stabilization is active
    pub stabilizing: bool,
}

impl ModeSnapshot {
    pub fn mode(&self) -> OperatingMode {
        OperatingMode::from_flags(self.alert_active, self.stabilizing)
    }
}

/// Blood pressure reading, serialized as "S/D"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloodPressure {
    pub systolic: i32,
    pub diastolic: i32,
}

impl std::fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.systolic, self.diastolic)
    }
}

impl Serialize for BloodPressure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BloodPressure {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let (sys, dia) = raw
            .split_once('/')
            .ok_or_else(|| serde::de::Error::custom("expected \"systolic/diastolic\""))?;
        Ok(Self {
            systolic: sys.trim().parse().map_err(serde::de::Error::custom)?,
            diastolic: dia.trim().parse().map_err(serde::de::Error::custom)?,
        })
    }
}

/// One telemetry frame, emitted once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Simulated heart rate (bpm)
    pub heart_rate: i32,
    /// Resting reference line (bpm)
    pub baseline_ghost: i32,
    /// Blood pressure
    #[serde(rename = "bp")]
    pub blood_pressure: BloodPressure,
    /// Sensor accuracy percentage, one decimal
    pub accuracy: f64,
    /// Echo of the alert flag at tick time
    #[serde(rename = "system_alert")]
    pub alert: bool,
    /// Echo of the stabilization flag at tick time
    #[serde(rename = "intervention_active")]
    pub intervention: bool,
    /// Cosmetic 8x8 signal map, two decimals
    #[serde(rename = "neural_heatmap")]
    pub heatmap: Vec<Vec<f64>>,
}

impl TelemetrySample {
    pub fn mode(&self) -> ModeSnapshot {
        ModeSnapshot {
            alert_active: self.alert,
            stabilizing: self.intervention,
        }
    }
}

/// Entry in the event (access) log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: u64,
    pub user: String,
    pub role: String,
    pub status: String,
    /// Wall-clock time, HH:MM:SS
    pub time: String,
    pub action: String,
}

/// Vitals as reported back by the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportedVitals {
    #[serde(default)]
    pub heart_rate: Option<i32>,
    #[serde(default)]
    pub bp: Option<String>,
}

/// Round to a fixed number of decimals
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stabilizing_wins_over_alert() {
        assert_eq!(OperatingMode::from_flags(true, true), OperatingMode::Stabilizing);
        assert_eq!(OperatingMode::from_flags(true, false), OperatingMode::Alert);
        assert_eq!(OperatingMode::from_flags(false, false), OperatingMode::Normal);
    }

    #[test]
    fn test_sample_wire_names() {
        let sample = TelemetrySample {
            heart_rate: 88,
            baseline_ghost: BASELINE_GHOST_BPM,
            blood_pressure: BloodPressure {
                systolic: 120,
                diastolic: 80,
            },
            accuracy: 82.4,
            alert: false,
            intervention: true,
            heatmap: vec![vec![0.5; HEATMAP_SIZE]; HEATMAP_SIZE],
        };

        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["heart_rate"], 88);
        assert_eq!(value["baseline_ghost"], 72);
        assert_eq!(value["bp"], "120/80");
        assert_eq!(value["system_alert"], false);
        assert_eq!(value["intervention_active"], true);
        assert_eq!(value["neural_heatmap"].as_array().unwrap().len(), 8);

        let back: TelemetrySample = serde_json::from_value(value).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_blood_pressure_rejects_garbage() {
        assert!(serde_json::from_str::<BloodPressure>("\"120-80\"").is_err());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(82.46, 1), 82.5);
        assert_eq!(round_to(0.123, 2), 0.12);
    }
}
