//! Ledger collaborators for QX finality monitoring.
//!
//! The monitor reads the ledger through three narrow traits:
//! - [`TickClock`]: current ledger tick
//! - [`LedgerReader`]: asset order books and entity trade history
//! - [`Broadcaster`]: transaction submission (acceptance is not confirmation)
//!
//! Production implementations talk HTTP ([`RpcClient`], [`QxApiClient`]);
//! [`CachedTickClock`] shares one tick reading between pending tasks and
//! [`MockLedger`] scripts ledger behavior for tests.

pub mod client;
pub mod error;
pub mod mock;
pub mod source;
pub mod tick_cache;

pub use client::{QxApiClient, RpcClient};
pub use error::{LedgerError, LedgerResult};
pub use mock::{LedgerChange, MockLedger};
pub use source::{
    BoxFuture, BroadcastReceipt, Broadcaster, DynBroadcaster, DynLedgerReader, DynTickClock,
    LedgerReader, TickClock,
};
pub use tick_cache::CachedTickClock;
