//! Heart-rate history
//!
//! Bounded rolling window of recently emitted heart rates, shared by every
//! telemetry stream and read by the forecast endpoint.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of heart rates retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 15;

/// Rolling FIFO of heart rates, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryBuffer {
    /// Rolling heart-rate values (bpm)
    values: VecDeque<i32>,
    /// Maximum window size
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// Create a new buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a heart rate, evicting the oldest values beyond capacity
    pub fn push(&mut self, heart_rate: i32) {
        self.values.push_back(heart_rate);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Snapshot of the window, oldest first
    pub fn snapshot(&self) -> Vec<i32> {
        self.values.iter().copied().collect()
    }

    /// Mean of the window, if any values are present
    pub fn rolling_average(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: i64 = self.values.iter().map(|&v| i64::from(v)).sum();
        Some(sum as f64 / self.values.len() as f64)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
