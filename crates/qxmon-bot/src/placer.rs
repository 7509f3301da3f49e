//! Order placement flow.
//!
//! Takes an already-signed QX order transaction, checks it against the
//! current ledger state, broadcasts it and hands it to the [`TaskMonitor`]
//! with a predicate chosen by the order's kind. The outcome arrives later
//! as an [`OrderNotice`] on the placer's notice channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use qxmon_core::{
    AssetKey, CoreError, EntityId, FillMode, OrderIntent, SignedTransaction, TaskId, Tick,
};
use qxmon_ledger::{DynBroadcaster, DynLedgerReader, DynTickClock, LedgerError};
use qxmon_monitor::{IntentPredicate, MonitorError, MonitorRequest, TaskMonitor, TaskOutcome};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Synchronous placement failures. No task is monitored when one occurs.
#[derive(Debug, Error)]
pub enum PlaceOrderError {
    #[error("Wallet not connected")]
    MissingOwner,

    #[error("Asset \"{0}\" not found")]
    AssetNotFound(String),

    #[error("Network tick info unavailable: {0}")]
    TickUnavailable(#[source] LedgerError),

    #[error("Not a QX order transaction: {0}")]
    NotQxOrder(#[source] CoreError),

    #[error("Transaction targets tick {target} but the network is already at tick {current}")]
    StaleTransaction { target: Tick, current: Tick },

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(#[source] LedgerError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// User-facing result of a monitored order.
#[derive(Debug, Clone)]
pub struct OrderNotice {
    pub task_id: TaskId,
    pub intent: OrderIntent,
    pub outcome: TaskOutcome,
    pub message: &'static str,
}

impl OrderNotice {
    pub fn is_success(&self) -> bool {
        self.outcome == TaskOutcome::Resolved
    }
}

/// Receipt of an accepted placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub task_id: TaskId,
    pub transaction_id: String,
    pub target_tick: Tick,
    pub deadline: Tick,
}

fn success_message(intent: &OrderIntent) -> &'static str {
    if intent.action.is_removal() {
        return "Order removed successfully";
    }
    match intent.fill {
        FillMode::Maker => "Order placed successfully",
        FillMode::Taker => "Order filled successfully",
    }
}

fn failure_message(intent: &OrderIntent) -> &'static str {
    if intent.action.is_removal() {
        return "Order removal failed";
    }
    match intent.fill {
        FillMode::Maker => "Order placement failed",
        FillMode::Taker => "Order fill failed",
    }
}

/// Broadcasts signed QX orders and tracks them to a final outcome.
pub struct OrderPlacer {
    clock: DynTickClock,
    reader: DynLedgerReader,
    broadcaster: DynBroadcaster,
    monitor: TaskMonitor,
    /// Upper-case asset name -> issuer.
    assets: BTreeMap<String, EntityId>,
    grace_ticks: u64,
    notices: mpsc::UnboundedSender<OrderNotice>,
    /// Flipped on every confirmed order so views know to reload.
    refetch: Arc<watch::Sender<bool>>,
}

impl OrderPlacer {
    /// Create a placer and the receiving end of its notice channel.
    pub fn new(
        clock: DynTickClock,
        reader: DynLedgerReader,
        broadcaster: DynBroadcaster,
        monitor: TaskMonitor,
        assets: BTreeMap<String, EntityId>,
        grace_ticks: u64,
    ) -> (Self, mpsc::UnboundedReceiver<OrderNotice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        let (refetch, _) = watch::channel(false);
        let assets = assets
            .into_iter()
            .map(|(name, issuer)| (name.to_ascii_uppercase(), issuer))
            .collect();
        let placer = Self {
            clock,
            reader,
            broadcaster,
            monitor,
            assets,
            grace_ticks,
            notices,
            refetch: Arc::new(refetch),
        };
        (placer, rx)
    }

    /// Receiver that changes whenever an order is confirmed.
    pub fn refetch_signal(&self) -> watch::Receiver<bool> {
        self.refetch.subscribe()
    }

    pub fn monitor(&self) -> &TaskMonitor {
        &self.monitor
    }

    /// Broadcast `tx` for `owner` and start monitoring it.
    ///
    /// `fill` is ignored for removals. On success the returned task id
    /// identifies the [`OrderNotice`] that will follow.
    pub async fn place(
        &self,
        tx: SignedTransaction,
        owner: Option<EntityId>,
        fill: FillMode,
    ) -> Result<PlacedOrder, PlaceOrderError> {
        let owner = owner.ok_or(PlaceOrderError::MissingOwner)?;
        let order = tx.qx_order().map_err(PlaceOrderError::NotQxOrder)?;

        let issuer = self
            .assets
            .get(&order.asset_name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| PlaceOrderError::AssetNotFound(order.asset_name.clone()))?;

        let current = self
            .clock
            .current_tick()
            .await
            .map_err(PlaceOrderError::TickUnavailable)?;
        let target_tick = tx.tick();
        if target_tick <= current {
            return Err(PlaceOrderError::StaleTransaction {
                target: target_tick,
                current,
            });
        }

        let intent = OrderIntent {
            asset: AssetKey::new(issuer, order.asset_name.clone())?,
            action: order.action,
            price: order.price,
            quantity: order.quantity,
            owner,
            fill,
        };

        let receipt = self
            .broadcaster
            .submit(&tx)
            .await
            .map_err(PlaceOrderError::BroadcastRejected)?;
        debug!(
            transaction_id = %receipt.transaction_id,
            peers = receipt.peers_broadcasted,
            "Transaction accepted for broadcast"
        );

        let task_id = TaskId::generate(&format!(
            "place-order-{}-{}-{}",
            intent.asset.name, intent.price, intent.quantity
        ));
        let deadline = target_tick + self.grace_ticks;

        let request = self.build_request(task_id.clone(), intent.clone(), deadline);
        self.monitor.start_monitoring(task_id.clone(), request)?;

        info!(
            task_id = %task_id,
            intent = %intent,
            tick = %target_tick,
            current = %current,
            deadline = %deadline,
            "Order broadcast, awaiting confirmation"
        );

        Ok(PlacedOrder {
            task_id,
            transaction_id: receipt.transaction_id,
            target_tick,
            deadline,
        })
    }

    fn build_request(&self, task_id: TaskId, intent: OrderIntent, deadline: Tick) -> MonitorRequest {
        let predicate = IntentPredicate::new(intent.clone(), Arc::clone(&self.reader));

        let success_tx = self.notices.clone();
        let success_id = task_id.clone();
        let success_intent = intent.clone();
        let refetch = Arc::clone(&self.refetch);

        let failure_tx = self.notices.clone();

        MonitorRequest::new(predicate, deadline)
            .on_success(move || async move {
                let message = success_message(&success_intent);
                info!(task_id = %success_id, "{message}");
                refetch.send_modify(|flag| *flag = !*flag);
                let _ = success_tx.send(OrderNotice {
                    task_id: success_id,
                    intent: success_intent,
                    outcome: TaskOutcome::Resolved,
                    message,
                });
            })
            .on_failure(move |reason| async move {
                let message = failure_message(&intent);
                warn!(task_id = %task_id, %reason, "{message}");
                let _ = failure_tx.send(OrderNotice {
                    task_id,
                    intent,
                    outcome: TaskOutcome::Expired(reason),
                    message,
                });
            })
    }
}
