//! Telemetry generation
//!
//! Each streaming connection owns a [`TelemetryGenerator`]. The generator
//! carries the connection's heart-rate cursor and turns the current mode into
//! one [`TelemetrySample`] per tick. Shared effects (history append) are the
//! caller's responsibility; see [`crate::monitor::Monitor::subscribe`].

use crate::types::{
    round_to, BloodPressure, ModeSnapshot, OperatingMode, TelemetrySample, BASELINE_GHOST_BPM,
    HEATMAP_SIZE,
};
use rand::Rng;

/// Cursor value for a freshly opened connection (bpm)
pub const INITIAL_CURSOR_BPM: i32 = 80;

/// Heart-rate range drawn while a code blue is active
pub const ALERT_HR_RANGE: std::ops::RangeInclusive<i32> = 120..=140;

/// Heart-rate range drawn in normal mode
pub const NORMAL_HR_RANGE: std::ops::RangeInclusive<i32> = 60..=110;

/// Per-connection sample generator
#[derive(Debug)]
pub struct TelemetryGenerator<R> {
    cursor: i32,
    target: i32,
    rng: R,
}

impl<R: Rng> TelemetryGenerator<R> {
    /// Create a generator with the default starting cursor
    pub fn new(target: i32, rng: R) -> Self {
        Self::with_cursor(INITIAL_CURSOR_BPM, target, rng)
    }

    /// Create a generator starting from a specific cursor
    pub fn with_cursor(cursor: i32, target: i32, rng: R) -> Self {
        Self { cursor, target, rng }
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    /// Produce the sample for one tick under the given mode
    pub fn tick(&mut self, mode: ModeSnapshot) -> TelemetrySample {
        let heart_rate = self.next_heart_rate(mode.mode());

        let blood_pressure = BloodPressure {
            systolic: self.rng.gen_range(110..=130),
            diastolic: self.rng.gen_range(70..=90),
        };
        let accuracy = round_to(self.rng.gen_range(80.5..=84.9), 1);
        let heatmap = signal_heatmap(&mut self.rng, HEATMAP_SIZE);

        TelemetrySample {
            heart_rate,
            baseline_ghost: BASELINE_GHOST_BPM,
            blood_pressure,
            accuracy,
            alert: mode.alert_active,
            intervention: mode.stabilizing,
            heatmap,
        }
    }

    /// Advance the cursor and return the emitted heart rate
    fn next_heart_rate(&mut self, mode: OperatingMode) -> i32 {
        match mode {
            OperatingMode::Stabilizing => {
                if self.cursor > self.target {
                    self.cursor -= self.rng.gen_range(1..=3);
                } else if self.cursor < self.target {
                    self.cursor += self.rng.gen_range(1..=2);
                }
                self.cursor
            }
            OperatingMode::Alert => {
                self.cursor = self.rng.gen_range(ALERT_HR_RANGE);
                self.cursor
            }
            OperatingMode::Normal => {
                self.cursor = self.rng.gen_range(NORMAL_HR_RANGE);
                self.cursor
            }
        }
    }
}

/// Square matrix of values in [0.1, 0.9], two decimals
pub fn signal_heatmap<R: Rng + ?Sized>(rng: &mut R, size: usize) -> Vec<Vec<f64>> {
    (0..size)
        .map(|_| {
            (0..size)
                .map(|_| round_to(rng.gen_range(0.1..=0.9), 2))
                .collect()
        })
        .collect()
}
