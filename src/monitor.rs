//! Shared monitor state
//!
//! [`Monitor`] is the single record shared by every HTTP handler and every
//! telemetry stream. Locks are only held for the duration of a synchronous
//! read or write, never across an `.await`, and a poisoned lock is recovered
//! rather than propagated.

use crate::advisor::{huddle_prompt, ClinicalAdvisor, GeminiAdvisor, OfflineAdvisor, SCAN_PROMPT};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::events::{AccessLog, AdvisorHistory, TACHYCARDIA_THRESHOLD_BPM};
use crate::forecast::{self, StabilityScore, TwinForecast};
use crate::history::HistoryBuffer;
use crate::mode::ModeController;
use crate::telemetry::TelemetryGenerator;
use crate::types::{AccessLogEntry, ModeSnapshot, ReportedVitals, TelemetrySample};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Query used when the dashboard sends none
pub const DEFAULT_QUERY: &str = "Analyze current status.";

/// Confidence reported for a successful scan analysis
pub const SCAN_CONFIDENCE: f64 = 0.98;

/// Result of a scan analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanAnalysis {
    pub analysis: String,
    pub confidence: f64,
}

/// Liveness report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub instance_id: String,
    pub uptime_secs: i64,
    pub open_streams: usize,
    pub advisor: String,
    pub advisor_available: bool,
    pub mode: ModeSnapshot,
}

/// Process-wide monitor state
pub struct Monitor {
    config: MonitorConfig,
    mode: RwLock<ModeController>,
    history: Mutex<HistoryBuffer>,
    access_log: RwLock<AccessLog>,
    advisor_history: Mutex<AdvisorHistory>,
    advisor: Arc<dyn ClinicalAdvisor>,
    open_streams: AtomicUsize,
    instance_id: String,
    started_at: DateTime<Utc>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Monitor {
    /// Create a monitor with an explicit advisor
    pub fn new(config: MonitorConfig, advisor: Arc<dyn ClinicalAdvisor>) -> Self {
        Self {
            mode: RwLock::new(ModeController::new(config.stabilization_target)),
            history: Mutex::new(HistoryBuffer::new(config.history_capacity)),
            access_log: RwLock::new(AccessLog::seeded()),
            advisor_history: Mutex::new(AdvisorHistory::default()),
            advisor,
            open_streams: AtomicUsize::new(0),
            instance_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            config,
        }
    }

    /// Create a monitor whose advisor is chosen from the config.
    ///
    /// Without an API key the offline advisor is used and every analysis
    /// falls back to its canned answer.
    pub fn from_config(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        let advisor: Arc<dyn ClinicalAdvisor> = match &config.advisor_api_key {
            Some(key) => Arc::new(GeminiAdvisor::new(key.clone(), config.advisor_model.clone())?),
            None => Arc::new(OfflineAdvisor),
        };
        Ok(Self::new(config, advisor))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Control operations
    // ------------------------------------------------------------------

    /// Start automated stabilization towards the target
    pub fn set_stabilize(&self) {
        write(&self.mode).stabilize();
        info!(target_bpm = self.target(), "stabilization engaged");
    }

    /// Raise a code blue and forget the advisor's interaction history
    pub fn set_code_blue(&self) {
        write(&self.mode).code_blue();
        lock(&self.advisor_history).clear();
        warn!("code blue activated");
    }

    /// Reset flags, verification and heart-rate history
    pub fn recalibrate(&self) {
        write(&self.mode).recalibrate();
        lock(&self.history).clear();
        info!("systems recalibrated");
    }

    /// Current mode flags
    pub fn mode(&self) -> ModeSnapshot {
        read(&self.mode).snapshot()
    }

    /// Stabilization target (bpm)
    pub fn target(&self) -> i32 {
        read(&self.mode).target()
    }

    /// Recent heart rates, oldest first
    pub fn history(&self) -> Vec<i32> {
        lock(&self.history).snapshot()
    }

    /// Verify the presented neural signature
    pub fn scrub_in(&self, signature: Option<&str>) -> Result<(), MonitorError> {
        let result = write(&self.mode).scrub_in(signature, &self.config.neural_signature);
        match &result {
            Ok(()) => info!("scrub-in verified"),
            Err(_) => warn!("scrub-in rejected"),
        }
        result
    }

    pub fn is_scrubbed_in(&self) -> bool {
        read(&self.mode).is_scrubbed_in()
    }

    /// Access log, newest first
    pub fn access_logs(&self) -> Vec<AccessLogEntry> {
        read(&self.access_log).entries().to_vec()
    }

    // ------------------------------------------------------------------
    // Telemetry
    // ------------------------------------------------------------------

    /// Generator for a new connection, seeded with the configured cursor
    pub fn generator<R: Rng>(&self, rng: R) -> TelemetryGenerator<R> {
        TelemetryGenerator::with_cursor(self.config.initial_cursor, self.target(), rng)
    }

    /// Run one tick for a connection: build the sample and record it
    pub fn tick<R: Rng>(&self, generator: &mut TelemetryGenerator<R>) -> TelemetrySample {
        let sample = generator.tick(self.mode());
        lock(&self.history).push(sample.heart_rate);
        sample
    }

    /// Infinite sample stream for one connection.
    ///
    /// The first sample is produced immediately; each later sample follows
    /// the previous one by the configured tick interval. Dropping the stream
    /// ends the connection's telemetry.
    pub fn subscribe<R>(self: &Arc<Self>, rng: R) -> impl Stream<Item = TelemetrySample> + Send
    where
        R: Rng + Send + 'static,
    {
        let generator = self.generator(rng);
        let interval = self.config.tick_interval;

        stream::unfold(
            (Arc::clone(self), generator, true),
            move |(monitor, mut generator, first)| async move {
                if !first {
                    tokio::time::sleep(interval).await;
                }
                let sample = monitor.tick(&mut generator);
                Some((sample, (monitor, generator, false)))
            },
        )
    }

    /// Track an open stream until the guard is dropped
    pub fn open_stream(self: &Arc<Self>) -> StreamGuard {
        let open = self.open_streams.fetch_add(1, Ordering::SeqCst) + 1;
        info!(open, mode = self.mode().mode().as_str(), "telemetry stream opened");
        StreamGuard {
            monitor: Arc::clone(self),
        }
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Analytics
    // ------------------------------------------------------------------

    /// Digital-twin forecast from the current history and mode
    pub fn forecast<R: Rng + ?Sized>(&self, rng: &mut R) -> TwinForecast {
        let average = lock(&self.history).rolling_average();
        forecast::predict(average, self.mode(), rng)
    }

    /// Stability score for reported vitals
    pub fn stability(&self, vitals: &ReportedVitals) -> StabilityScore {
        forecast::stability_score(vitals.heart_rate.unwrap_or(0), self.mode())
    }

    /// Ask the clinical panel about the reported vitals.
    ///
    /// Never fails: advisor errors produce the canned stable report.
    pub async fn consult(&self, vitals: &ReportedVitals, query: Option<&str>) -> String {
        let heart_rate = vitals.heart_rate.unwrap_or(0);
        let bp = vitals.bp.as_deref().unwrap_or("0/0");
        let query = query.unwrap_or(DEFAULT_QUERY);

        if heart_rate > TACHYCARDIA_THRESHOLD_BPM {
            let id = write(&self.access_log).record_tachycardia(heart_rate).id;
            warn!(heart_rate, entry = id, "tachycardia logged during consultation");
        }

        let context = lock(&self.advisor_history).as_context();
        let prompt = huddle_prompt(&context, heart_rate, bp, query);

        match self.advisor.consult(&prompt).await {
            Ok(reply) => {
                let report = reply.trim().to_string();
                lock(&self.advisor_history).push(query, &report);
                report
            }
            Err(e) => {
                warn!(advisor = self.advisor.name(), error = %e, "consultation fell back");
                format!("STABLE: specialist panel suggests monitoring HR {heart_rate} BPM.")
            }
        }
    }

    /// Run the vision model over an uploaded scan
    pub async fn analyze_scan(&self, image: &[u8], mime_type: &str) -> ScanAnalysis {
        let result = if image.is_empty() {
            Err(MonitorError::Validation("uploaded scan is empty".to_string()))
        } else {
            self.advisor.inspect(SCAN_PROMPT, image, mime_type).await
        };

        match result {
            Ok(text) => ScanAnalysis {
                analysis: format!("Vision Engine: {text}"),
                confidence: SCAN_CONFIDENCE,
            },
            Err(e) => {
                warn!(error = %e, "scan analysis failed");
                ScanAnalysis::failed(&e)
            }
        }
    }

    /// Liveness report
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            version: crate::ICU_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            open_streams: self.open_streams(),
            advisor: self.advisor.name().to_string(),
            advisor_available: self.advisor.is_available(),
            mode: self.mode(),
        }
    }
}

impl ScanAnalysis {
    /// Analysis reported when the scan could not be processed
    pub fn failed(error: &MonitorError) -> Self {
        Self {
            analysis: format!("Vision Engine Error: {error}"),
            confidence: 0.0,
        }
    }
}

/// Decrements the open stream count on drop
pub struct StreamGuard {
    monitor: Arc<Monitor>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let open = self.monitor.open_streams.fetch_sub(1, Ordering::SeqCst) - 1;
        info!(open, "telemetry stream closed");
    }
}
