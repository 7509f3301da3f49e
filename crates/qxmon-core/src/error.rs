//! Error types for qxmon-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid entity id: {0}")]
    InvalidEntity(String),

    #[error("Invalid asset name: {0}")]
    InvalidAssetName(String),

    #[error("Transaction decode error: {0}")]
    TransactionDecode(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
