//! Ledger collaborator traits.
//!
//! The monitor never talks HTTP directly; it reads through these traits so
//! that tests can script ledger behavior and production can swap transports.
//! Methods return boxed futures to stay dyn-compatible.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use qxmon_core::{AssetKey, BookOrder, BookSide, EntityId, SignedTransaction, Tick, TradeRecord};

use crate::error::LedgerResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of the ledger's current tick.
///
/// Implementations must be monotonic non-decreasing. Consumers still
/// guard against regressions.
pub trait TickClock: Send + Sync {
    fn current_tick(&self) -> BoxFuture<'_, LedgerResult<Tick>>;
}

/// Read-only view of QX order books and trade history.
pub trait LedgerReader: Send + Sync {
    /// Resting orders on one side of an asset's book.
    fn orders<'a>(
        &'a self,
        asset: &'a AssetKey,
        side: BookSide,
    ) -> BoxFuture<'a, LedgerResult<Vec<BookOrder>>>;

    /// Trades in which `entity` took part.
    fn trades<'a>(&'a self, entity: &'a EntityId) -> BoxFuture<'a, LedgerResult<Vec<TradeRecord>>>;
}

/// Receipt for an accepted broadcast.
///
/// Acceptance only means the transaction entered a future tick's candidate
/// set. It is not confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    pub transaction_id: String,
    pub peers_broadcasted: u32,
}

/// Transaction submission.
pub trait Broadcaster: Send + Sync {
    fn submit<'a>(&'a self, tx: &'a SignedTransaction)
        -> BoxFuture<'a, LedgerResult<BroadcastReceipt>>;
}

/// Arc wrappers for trait objects.
pub type DynTickClock = Arc<dyn TickClock>;
pub type DynLedgerReader = Arc<dyn LedgerReader>;
pub type DynBroadcaster = Arc<dyn Broadcaster>;
