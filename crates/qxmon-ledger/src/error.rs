//! Ledger client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    /// The ledger refused the transaction; nothing will be monitored.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Core error: {0}")]
    Core(#[from] qxmon_core::CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HttpClient(_) => "http",
            Self::Status { .. } => "status",
            Self::Parse(_) | Self::Json(_) => "parse",
            Self::Rejected(_) => "rejected",
            Self::Unavailable(_) => "unavailable",
            Self::Core(_) => "core",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
