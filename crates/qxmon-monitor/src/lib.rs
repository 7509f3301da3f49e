//! Polling-based confirmation monitor for broadcast QX transactions.
//!
//! Broadcasting a transaction only means it was accepted into a future
//! tick's candidate set. [`TaskMonitor`] tracks each broadcast until its
//! intended effect is visible on the ledger (resolved) or the ledger clock
//! passes its deadline tick (expired), invoking exactly one callback.
//!
//! - [`ConfirmationPredicate`]: the per-intent ledger check
//! - [`MonitorRequest`]: predicate, deadline tick and callbacks
//! - [`WakeHint`]: push signal that shortens the wait between polls

pub mod config;
pub mod error;
pub mod hint;
pub mod monitor;
pub mod predicate;
mod registry;
pub mod task;

pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use hint::WakeHint;
pub use monitor::TaskMonitor;
pub use predicate::{ConfirmationPredicate, FnPredicate, IntentPredicate};
pub use registry::TaskSnapshot;
pub use task::{FailureReason, MonitorRequest, TaskOutcome, TaskStatus};
