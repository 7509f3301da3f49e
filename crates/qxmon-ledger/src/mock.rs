//! Scripted in-memory ledger for tests.
//!
//! [`MockLedger`] implements every ledger trait. Ticks come from a script
//! (one entry consumed per successful read, the last value repeats), book
//! and trade changes can be scheduled to appear at a tick, and reads can be
//! made to fail a given number of times.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::Mutex;
use qxmon_core::{AssetKey, BookOrder, BookSide, EntityId, SignedTransaction, Tick, TradeRecord};

use crate::error::{LedgerError, LedgerResult};
use crate::source::{BoxFuture, BroadcastReceipt, Broadcaster, LedgerReader, TickClock};

/// A ledger state change applied once the clock reaches a tick.
#[derive(Debug, Clone)]
pub enum LedgerChange {
    AddOrder {
        asset: String,
        side: BookSide,
        order: BookOrder,
    },
    RemoveOrder {
        asset: String,
        side: BookSide,
        order: BookOrder,
    },
    AddTrade(TradeRecord),
}

#[derive(Debug, Default)]
struct LedgerState {
    script: VecDeque<Tick>,
    current: Tick,
    books: HashMap<(String, BookSide), Vec<BookOrder>>,
    trades: Vec<TradeRecord>,
    scheduled: Vec<(Tick, LedgerChange)>,
    submitted: Vec<SignedTransaction>,
    reject_reason: Option<String>,
}

impl LedgerState {
    fn set_current(&mut self, tick: Tick) {
        if tick > self.current {
            self.current = tick;
        }
        let current = self.current;
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|(at, _)| *at <= current);
        self.scheduled = later;
        for (_, change) in due {
            self.apply(change);
        }
    }

    fn apply(&mut self, change: LedgerChange) {
        match change {
            LedgerChange::AddOrder { asset, side, order } => {
                self.books.entry((asset, side)).or_default().push(order);
            }
            LedgerChange::RemoveOrder { asset, side, order } => {
                if let Some(book) = self.books.get_mut(&(asset, side)) {
                    book.retain(|o| o != &order);
                }
            }
            LedgerChange::AddTrade(trade) => self.trades.push(trade),
        }
    }
}

/// Scripted ledger implementing [`TickClock`], [`LedgerReader`] and
/// [`Broadcaster`].
#[derive(Debug, Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    tick_failures: AtomicU32,
    read_failures: AtomicU32,
    tick_calls: AtomicUsize,
    order_calls: AtomicUsize,
    trade_calls: AtomicUsize,
}

impl MockLedger {
    /// Ledger whose tick stays at `tick`.
    pub fn at_tick(tick: u64) -> Self {
        let ledger = Self::default();
        ledger.state.lock().current = Tick::new(tick);
        ledger
    }

    /// Ledger whose tick reads follow `ticks`, repeating the last one.
    pub fn with_ticks(ticks: impl IntoIterator<Item = u64>) -> Self {
        let ledger = Self::default();
        ledger.state.lock().script = ticks.into_iter().map(Tick::new).collect();
        ledger
    }

    /// Move the clock forward immediately, applying due changes.
    pub fn advance_to(&self, tick: u64) {
        self.state.lock().set_current(Tick::new(tick));
    }

    /// Tick of the most recent read.
    pub fn last_tick(&self) -> Tick {
        self.state.lock().current
    }

    /// Put an order on the book now.
    pub fn add_order(&self, asset: &str, side: BookSide, order: BookOrder) {
        self.state.lock().apply(LedgerChange::AddOrder {
            asset: asset.to_string(),
            side,
            order,
        });
    }

    /// Record a trade now.
    pub fn add_trade(&self, trade: TradeRecord) {
        self.state.lock().apply(LedgerChange::AddTrade(trade));
    }

    /// Apply `change` once the clock reaches `at`.
    pub fn schedule(&self, at: u64, change: LedgerChange) {
        let mut state = self.state.lock();
        if Tick::new(at) <= state.current {
            state.apply(change);
        } else {
            state.scheduled.push((Tick::new(at), change));
        }
    }

    /// Fail the next `n` tick reads.
    pub fn fail_next_tick_reads(&self, n: u32) {
        self.tick_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` order/trade reads.
    pub fn fail_next_reads(&self, n: u32) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    /// Reject every broadcast with `reason` (None accepts again).
    pub fn set_reject(&self, reason: Option<&str>) {
        self.state.lock().reject_reason = reason.map(str::to_string);
    }

    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.state.lock().submitted.clone()
    }

    pub fn tick_calls(&self) -> usize {
        self.tick_calls.load(Ordering::SeqCst)
    }

    pub fn order_calls(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }

    pub fn trade_calls(&self) -> usize {
        self.trade_calls.load(Ordering::SeqCst)
    }

    /// Consume one unit of an injected failure budget.
    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn next_tick(&self) -> LedgerResult<Tick> {
        self.tick_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.tick_failures) {
            return Err(LedgerError::Unavailable("scripted tick failure".to_string()));
        }
        let mut state = self.state.lock();
        let scripted = if state.script.len() > 1 {
            state.script.pop_front()
        } else {
            state.script.front().copied()
        };
        let next = scripted.unwrap_or(state.current);
        // Report the script value as-is so clock regressions reach callers.
        state.set_current(next);
        Ok(next)
    }

    fn read_orders(&self, asset: &AssetKey, side: BookSide) -> LedgerResult<Vec<BookOrder>> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.read_failures) {
            return Err(LedgerError::Unavailable("scripted read failure".to_string()));
        }
        Ok(self
            .state
            .lock()
            .books
            .get(&(asset.name.clone(), side))
            .cloned()
            .unwrap_or_default())
    }

    fn read_trades(&self, entity: &EntityId) -> LedgerResult<Vec<TradeRecord>> {
        self.trade_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.read_failures) {
            return Err(LedgerError::Unavailable("scripted read failure".to_string()));
        }
        Ok(self
            .state
            .lock()
            .trades
            .iter()
            .filter(|t| &t.taker == entity || t.maker.as_ref() == Some(entity))
            .cloned()
            .collect())
    }
}

impl TickClock for MockLedger {
    fn current_tick(&self) -> BoxFuture<'_, LedgerResult<Tick>> {
        Box::pin(async move { self.next_tick() })
    }
}

impl LedgerReader for MockLedger {
    fn orders<'a>(
        &'a self,
        asset: &'a AssetKey,
        side: BookSide,
    ) -> BoxFuture<'a, LedgerResult<Vec<BookOrder>>> {
        Box::pin(async move { self.read_orders(asset, side) })
    }

    fn trades<'a>(&'a self, entity: &'a EntityId) -> BoxFuture<'a, LedgerResult<Vec<TradeRecord>>> {
        Box::pin(async move { self.read_trades(entity) })
    }
}

impl Broadcaster for MockLedger {
    fn submit<'a>(
        &'a self,
        tx: &'a SignedTransaction,
    ) -> BoxFuture<'a, LedgerResult<BroadcastReceipt>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if let Some(reason) = state.reject_reason.clone() {
                return Err(LedgerError::Rejected(reason));
            }
            state.submitted.push(tx.clone());
            Ok(BroadcastReceipt {
                transaction_id: format!("mocktx{}", state.submitted.len()),
                peers_broadcasted: 3,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qxmon_core::{Price, Quantity};

    fn order(price: i64, owner: &str) -> BookOrder {
        BookOrder {
            price: Price::from_units(price),
            quantity: Quantity::from_units(1),
            owner: EntityId::new(owner).unwrap(),
        }
    }

    #[test]
    fn test_tick_script_repeats_last() {
        let ledger = MockLedger::with_ticks([1, 2]);
        assert_eq!(tokio_test::block_on(ledger.current_tick()).unwrap(), Tick::new(1));
        assert_eq!(tokio_test::block_on(ledger.current_tick()).unwrap(), Tick::new(2));
        assert_eq!(tokio_test::block_on(ledger.current_tick()).unwrap(), Tick::new(2));
        assert_eq!(ledger.tick_calls(), 3);
    }

    #[test]
    fn test_scheduled_change_applies_at_tick() {
        let ledger = MockLedger::with_ticks([10, 11, 12]);
        let asset = AssetKey::new(EntityId::new("ISSUER").unwrap(), "CFB").unwrap();
        ledger.schedule(
            11,
            LedgerChange::AddOrder {
                asset: "CFB".to_string(),
                side: BookSide::Bid,
                order: order(5, "OWNER"),
            },
        );

        tokio_test::block_on(ledger.current_tick()).unwrap();
        let book = tokio_test::block_on(ledger.orders(&asset, BookSide::Bid)).unwrap();
        assert!(book.is_empty());

        tokio_test::block_on(ledger.current_tick()).unwrap();
        let book = tokio_test::block_on(ledger.orders(&asset, BookSide::Bid)).unwrap();
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_failure_budget_is_consumed() {
        let ledger = MockLedger::at_tick(1);
        ledger.fail_next_reads(2);
        let owner = EntityId::new("OWNER").unwrap();

        assert!(tokio_test::block_on(ledger.trades(&owner)).is_err());
        assert!(tokio_test::block_on(ledger.trades(&owner)).is_err());
        assert!(tokio_test::block_on(ledger.trades(&owner)).is_ok());
        assert_eq!(ledger.trade_calls(), 3);
    }
}
