//! Application wiring.
//!
//! Builds the ledger clients, the task monitor and the order placer from
//! an [`AppConfig`], and runs the optional push-hint listener next to them.

use std::sync::Arc;
use std::time::Duration;

use qxmon_core::{EntityId, FillMode, SignedTransaction, TickInfo};
use qxmon_ledger::{CachedTickClock, DynTickClock, QxApiClient, RpcClient};
use qxmon_monitor::TaskMonitor;
use qxmon_notify::HintListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::placer::{OrderNotice, OrderPlacer, PlacedOrder};

/// Main application.
pub struct Application {
    config: AppConfig,
    rpc: Arc<RpcClient>,
    monitor: TaskMonitor,
    placer: OrderPlacer,
    notices: mpsc::UnboundedReceiver<OrderNotice>,
    listener: Option<Arc<HintListener>>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let rpc = Arc::new(RpcClient::new(config.rpc_url.clone())?);
        let qx_api = Arc::new(QxApiClient::new(config.qx_api_url.clone())?);

        let clock: DynTickClock = Arc::new(CachedTickClock::new(
            rpc.clone(),
            Duration::from_millis(config.tick_cache_ttl_ms),
        ));
        let monitor = TaskMonitor::new(clock.clone(), config.monitor.clone())?;

        let (placer, notices) = OrderPlacer::new(
            clock,
            qx_api,
            rpc.clone(),
            monitor.clone(),
            config.asset_issuers()?,
            config.orders.confirmation_grace_ticks,
        );

        let listener = config
            .notify_enabled()
            .then(|| Arc::new(HintListener::new(config.notify.clone(), monitor.hint_sender())));

        Ok(Self {
            config,
            rpc,
            monitor,
            placer,
            notices,
            listener,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current network tick info.
    pub async fn tick_info(&self) -> AppResult<TickInfo> {
        Ok(self.rpc.fetch_tick_info().await?)
    }

    /// Broadcast a base64 signed order and wait for its outcome.
    ///
    /// Ctrl-C cancels the pending task and returns [`AppError::Shutdown`].
    pub async fn place(
        &mut self,
        encoded_tx: &str,
        owner: Option<&str>,
        fill: FillMode,
    ) -> AppResult<OrderNotice> {
        let tx = SignedTransaction::from_base64(encoded_tx)?;
        let owner = owner.map(EntityId::new).transpose()?;

        let listener_handle = self.spawn_listener();
        let result = self.place_and_wait(tx, owner, fill).await;

        self.shutdown(listener_handle).await;
        result
    }

    async fn place_and_wait(
        &mut self,
        tx: SignedTransaction,
        owner: Option<EntityId>,
        fill: FillMode,
    ) -> AppResult<OrderNotice> {
        let PlacedOrder {
            task_id,
            transaction_id,
            target_tick,
            deadline,
        } = self.placer.place(tx, owner, fill).await?;
        info!(
            %task_id,
            %transaction_id,
            tick = %target_tick,
            %deadline,
            "Waiting for confirmation"
        );

        loop {
            tokio::select! {
                notice = self.notices.recv() => {
                    match notice {
                        Some(notice) if notice.task_id == task_id => return Ok(notice),
                        Some(other) => {
                            warn!(task_id = %other.task_id, "Notice for unrelated task");
                        }
                        None => return Err(AppError::Shutdown),
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    if self.monitor.cancel(&task_id) {
                        warn!(%task_id, "Monitoring cancelled before an outcome");
                    }
                    return Err(AppError::Shutdown);
                }
            }
        }
    }

    fn spawn_listener(&self) -> Option<JoinHandle<()>> {
        let listener = self.listener.clone()?;
        info!(url = %self.config.notify.url, "Starting push-hint listener");
        Some(tokio::spawn(async move {
            if let Err(e) = listener.run().await {
                error!(?e, "Push-hint listener stopped, relying on polling");
            }
        }))
    }

    async fn shutdown(&self, listener_handle: Option<JoinHandle<()>>) {
        let abandoned = self.monitor.shutdown();
        if abandoned > 0 {
            warn!(abandoned, "Pending tasks abandoned at shutdown");
        }

        if let Some(listener) = &self.listener {
            listener.shutdown();
        }
        if let Some(handle) = listener_handle {
            if tokio::time::timeout(Duration::from_secs(2), handle).await.is_err() {
                warn!("Push-hint listener did not stop in time");
            }
        }
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_without_notifier() {
        let app = Application::new(AppConfig::default()).unwrap();
        assert!(app.listener.is_none());
        assert_eq!(app.monitor.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_new_with_notifier() {
        let mut config = AppConfig::default();
        config.notify.url = "https://api.qubic.example".to_string();
        let app = Application::new(config).unwrap();
        assert!(app.listener.is_some());
    }

    #[tokio::test]
    async fn test_place_rejects_bad_encoding() {
        let mut app = Application::new(AppConfig::default()).unwrap();
        let err = app.place("not base64!", Some("OWNER"), FillMode::Taker).await.unwrap_err();
        assert!(matches!(err, AppError::Core(_)));
    }
}
