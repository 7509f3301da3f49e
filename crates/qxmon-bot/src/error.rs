//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] qxmon_ledger::LedgerError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] qxmon_monitor::MonitorError),

    #[error("Order error: {0}")]
    Order(#[from] crate::placer::PlaceOrderError),

    #[error("Core error: {0}")]
    Core(#[from] qxmon_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] qxmon_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;
