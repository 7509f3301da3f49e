//! Prometheus metrics and structured logging for qxmon.
//!
//! - Task monitor counters (registered, finished by outcome, polls, read errors)
//! - Push-hint listener connection state
//! - `tracing` subscriber setup

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
