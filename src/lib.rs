//! Synheart ICU - Simulated ICU monitoring backend
//!
//! Streams synthetic vital signs to dashboard clients and exposes the control
//! and analytics endpoints around them:
//! mode controller → per-connection telemetry generator → shared history →
//! forecasts and advisor consultations.
//!
//! ## Modules
//!
//! - **Telemetry**: mode-dependent heart-rate simulation, one sample per tick
//! - **Monitor**: shared state behind every stream and HTTP handler
//! - **Server**: axum routes and the `/ws/vitals` WebSocket

pub mod advisor;
pub mod config;
pub mod error;
pub mod events;
pub mod forecast;
pub mod history;
pub mod mode;
pub mod monitor;
pub mod server;
pub mod telemetry;
pub mod types;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use monitor::Monitor;
pub use server::{router, run_server};
pub use telemetry::TelemetryGenerator;
pub use types::{ModeSnapshot, OperatingMode, TelemetrySample};

/// Crate version reported by the health endpoint
pub const ICU_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "synheart-icu";
