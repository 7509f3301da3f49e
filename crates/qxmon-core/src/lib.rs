//! Core domain types for QX transaction-finality monitoring.
//!
//! This crate provides the types shared by the ledger clients, the task
//! monitor and the order placer:
//! - `Tick`: ledger logical time (never mixed with wall-clock durations)
//! - `Price`, `Quantity`: precision-safe numeric types
//! - `OrderIntent`, `OrderAction`, `FillMode`: what a transaction should do
//! - `BookOrder`, `TradeRecord`: ledger read results
//! - `SignedTransaction`: decoding of already-signed transactions

pub mod decimal;
pub mod error;
pub mod order;
pub mod tick;
pub mod transaction;
pub mod types;

pub use decimal::{Price, Quantity};
pub use error::{CoreError, Result};
pub use order::{AssetKey, BookSide, EntityId, FillMode, OrderAction, OrderIntent, TaskId};
pub use tick::Tick;
pub use transaction::{QxOrderPayload, SignedTransaction, TransactionHeader};
pub use types::{BookOrder, TickInfo, TradeRecord};
