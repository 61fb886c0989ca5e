//! In-memory event logs
//!
//! The access log is shown newest-first on the dashboard's audit panel. The
//! advisor history feeds recent question/answer pairs back into the next
//! consultation prompt.

use crate::types::AccessLogEntry;
use chrono::Local;
use std::collections::VecDeque;

/// Number of advisor exchanges kept as prompt context
pub const DEFAULT_ADVISOR_HISTORY: usize = 3;

/// Heart rate above which a consultation is logged as tachycardia (bpm)
pub const TACHYCARDIA_THRESHOLD_BPM: i32 = 100;

/// Newest-first access log
#[derive(Debug, Clone)]
pub struct AccessLog {
    entries: Vec<AccessLogEntry>,
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::seeded()
    }
}

impl AccessLog {
    /// Empty log
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Log pre-populated with the startup entries
    pub fn seeded() -> Self {
        Self {
            entries: vec![
                AccessLogEntry {
                    id: 1,
                    user: "Dr. Aris Thorne".to_string(),
                    role: "Lead Surgeon".to_string(),
                    status: "Bio-Verified".to_string(),
                    time: "18:42:01".to_string(),
                    action: "Neural Interface Connected".to_string(),
                },
                AccessLogEntry {
                    id: 2,
                    user: "System Admin".to_string(),
                    role: "Database Sync".to_string(),
                    status: "Internal".to_string(),
                    time: "14:20:55".to_string(),
                    action: "Federated Weights Merged".to_string(),
                },
            ],
        }
    }

    /// Insert an entry at the head, assigning the next id
    pub fn record(
        &mut self,
        user: &str,
        role: &str,
        status: &str,
        action: String,
    ) -> &AccessLogEntry {
        let id = self.entries.iter().map(|e| e.id).max().map_or(1, |max| max + 1);
        self.entries.insert(
            0,
            AccessLogEntry {
                id,
                user: user.to_string(),
                role: role.to_string(),
                status: status.to_string(),
                time: Local::now().format("%H:%M:%S").to_string(),
                action,
            },
        );
        &self.entries[0]
    }

    /// Record a tachycardia alert raised during a consultation
    pub fn record_tachycardia(&mut self, heart_rate: i32) -> &AccessLogEntry {
        self.record(
            "AI MONITOR",
            "Emergency Protocol",
            "CRITICAL",
            format!("Tachycardia Alert: HR {heart_rate} BPM detected during AI Analysis."),
        )
    }

    pub fn entries(&self) -> &[AccessLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bounded FIFO of recent advisor exchanges
#[derive(Debug, Clone)]
pub struct AdvisorHistory {
    exchanges: VecDeque<String>,
    capacity: usize,
}

impl Default for AdvisorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_ADVISOR_HISTORY)
    }
}

impl AdvisorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Remember a question and the report it produced
    pub fn push(&mut self, query: &str, report: &str) {
        self.exchanges.push_back(format!("Q: {query} | A: {report}"));
        while self.exchanges.len() > self.capacity {
            self.exchanges.pop_front();
        }
    }

    /// Render the history as prompt context, one line per exchange
    pub fn as_context(&self) -> String {
        self.exchanges
            .iter()
            .map(|h| format!("Interaction: {h}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_log() {
        let log = AccessLog::seeded();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].user, "Dr. Aris Thorne");
    }

    #[test]
    fn test_tachycardia_entry_goes_first() {
        let mut log = AccessLog::seeded();
        let entry = log.record_tachycardia(128).clone();

        assert_eq!(entry.id, 3);
        assert_eq!(entry.status, "CRITICAL");
        assert_eq!(
            entry.action,
            "Tachycardia Alert: HR 128 BPM detected during AI Analysis."
        );
        assert_eq!(entry.time.len(), 8);
        assert_eq!(log.entries()[0], entry);
    }

    #[test]
    fn test_first_id_on_empty_log() {
        let mut log = AccessLog::new();
        assert!(log.is_empty());
        assert_eq!(log.record_tachycardia(101).id, 1);
    }

    #[test]
    fn test_advisor_history_bound() {
        let mut history = AdvisorHistory::default();
        for i in 0..5 {
            history.push(&format!("q{i}"), &format!("a{i}"));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(
            history.as_context(),
            "Interaction: Q: q2 | A: a2\nInteraction: Q: q3 | A: a3\nInteraction: Q: q4 | A: a4"
        );

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.as_context(), "");
    }
}
