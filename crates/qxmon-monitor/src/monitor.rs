//! Task monitor service and per-task poll loop.
//!
//! Each registered task gets its own tokio task running [`PollLoop`]:
//!
//! 1. stop silently if the registration is no longer Pending
//! 2. read the current tick (a failed read backs off and retries)
//! 3. expire if the tick is at or past the deadline
//! 4. evaluate the predicate (an error counts as "not yet")
//! 5. resolve if it confirmed
//! 6. sleep, waking early on a push hint or cancellation
//!
//! The deadline check precedes the predicate, so a confirmation first
//! observable on the deadline tick still expires.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qxmon_core::{TaskId, Tick};
use qxmon_ledger::DynTickClock;
use qxmon_telemetry::Metrics;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::hint::WakeHint;
use crate::predicate::ConfirmationPredicate;
use crate::registry::{TaskRegistry, TaskSnapshot};
use crate::task::{FailureCallback, FailureReason, MonitorRequest, SuccessCallback, TaskStatus};

struct MonitorInner {
    registry: TaskRegistry,
    clock: DynTickClock,
    config: MonitorConfig,
    hint: WakeHint,
    /// Parent of every task's wake token.
    shutdown: CancellationToken,
    closed: AtomicBool,
}

/// Registry of pending confirmation tasks.
///
/// Cheap to clone; clones share the same registry. Must be used from
/// within a tokio runtime since registration spawns the poll loop.
#[derive(Clone)]
pub struct TaskMonitor {
    inner: Arc<MonitorInner>,
}

impl TaskMonitor {
    /// Create a monitor reading ticks from `clock`.
    pub fn new(clock: DynTickClock, config: MonitorConfig) -> MonitorResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(MonitorInner {
                registry: TaskRegistry::default(),
                clock,
                config,
                hint: WakeHint::new(),
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Register a task and start polling it.
    ///
    /// The result only reports whether the task was accepted. The outcome
    /// is delivered exactly once through the request's callbacks, or not at
    /// all if the task is cancelled.
    pub fn start_monitoring(
        &self,
        id: impl Into<TaskId>,
        request: MonitorRequest,
    ) -> MonitorResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(MonitorError::ShuttingDown);
        }

        let id = id.into();
        let intent = request.predicate.label();
        let registration = match self.inner.registry.register(
            &id,
            request.deadline,
            intent,
            self.inner.shutdown.child_token(),
        ) {
            Ok(registration) => registration,
            Err(e) => {
                Metrics::task_duplicate();
                warn!(task_id = %id, "Rejected duplicate task registration");
                return Err(e);
            }
        };

        Metrics::task_registered(intent);
        info!(
            task_id = %id,
            intent,
            deadline = %request.deadline,
            generation = registration.generation,
            "Monitoring started"
        );

        let poller = PollLoop {
            inner: Arc::clone(&self.inner),
            hints: self.inner.hint.subscribe(),
            id,
            generation: registration.generation,
            wake: registration.wake,
            predicate: request.predicate,
            deadline: request.deadline,
            on_success: request.on_success,
            on_failure: request.on_failure,
            started: Instant::now(),
        };
        tokio::spawn(poller.run());
        Ok(())
    }

    /// Cancel a Pending task. No callback fires for it, even if a read is
    /// in flight. Returns whether a Pending task was cancelled.
    pub fn cancel(&self, id: &TaskId) -> bool {
        self.cancel_entry(id).is_some()
    }

    fn cancel_entry(&self, id: &TaskId) -> Option<TaskSnapshot> {
        let snapshot = self.inner.registry.cancel(id)?;
        let elapsed = (chrono::Utc::now() - snapshot.created_at)
            .num_milliseconds()
            .max(0);
        Metrics::task_finished(TaskStatus::Cancelled.as_str(), elapsed as f64);
        info!(task_id = %id, intent = snapshot.intent, "Task cancelled");
        Some(snapshot)
    }

    /// Current status, `None` once the task has been removed.
    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.inner.registry.status(id)
    }

    pub fn snapshot(&self, id: &TaskId) -> Option<TaskSnapshot> {
        self.inner.registry.snapshot(id)
    }

    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.status(id) == Some(TaskStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.registry.pending_count()
    }

    /// Handle for push listeners to wake sleeping pollers.
    pub fn hint_sender(&self) -> WakeHint {
        self.inner.hint.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Cancel every pending task without callbacks and refuse new
    /// registrations. Returns the number of tasks cancelled.
    pub fn shutdown(&self) -> usize {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let cancelled = self
            .inner
            .registry
            .pending_ids()
            .into_iter()
            .filter(|id| self.cancel_entry(id).is_some())
            .count();
        self.inner.shutdown.cancel();
        info!(cancelled, "Task monitor shut down");
        cancelled
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Poller state for one registration.
struct PollLoop {
    inner: Arc<MonitorInner>,
    hints: watch::Receiver<u64>,
    id: TaskId,
    generation: u64,
    wake: CancellationToken,
    predicate: Arc<dyn ConfirmationPredicate>,
    deadline: Tick,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
    started: Instant,
}

impl PollLoop {
    async fn run(mut self) {
        let config = self.inner.config.clone();
        let mut polls: u32 = 0;
        let mut consecutive_errors: u32 = 0;
        let mut highest: Option<Tick> = None;

        loop {
            if !self.inner.registry.is_live(&self.id, self.generation) {
                debug!(task_id = %self.id, "Task no longer pending, poller exiting");
                return;
            }
            if self.wake.is_cancelled() {
                self.abandon();
                return;
            }

            let elapsed = self.started.elapsed();
            if elapsed >= config.max_wall_clock() {
                self.expire(FailureReason::WallClockCeiling { elapsed }).await;
                return;
            }
            if let Some(max_polls) = config.max_polls {
                if polls >= max_polls {
                    self.expire(FailureReason::PollLimit { polls }).await;
                    return;
                }
            }

            polls += 1;
            Metrics::poll();
            let poll_started = Instant::now();

            let fetched = match self.inner.clock.current_tick().await {
                Ok(tick) => tick,
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    Metrics::read_error("tick", e.kind());
                    warn!(
                        task_id = %self.id,
                        error = %e,
                        consecutive_errors,
                        "Tick read failed, retrying"
                    );
                    if !self.wait(&config, consecutive_errors, poll_started).await {
                        self.abandon();
                        return;
                    }
                    continue;
                }
            };

            let current = match highest {
                Some(prev) if fetched < prev => {
                    warn!(
                        task_id = %self.id,
                        fetched = %fetched,
                        highest = %prev,
                        "Tick went backwards, keeping highest"
                    );
                    prev
                }
                _ => fetched,
            };
            highest = Some(current);

            if current.has_reached(self.deadline) {
                self.expire(FailureReason::DeadlineReached {
                    current,
                    deadline: self.deadline,
                })
                .await;
                return;
            }

            let confirmed = match self.predicate.evaluate().await {
                Ok(confirmed) => {
                    consecutive_errors = 0;
                    confirmed
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    Metrics::read_error("predicate", e.kind());
                    warn!(
                        task_id = %self.id,
                        tick = %current,
                        error = %e,
                        consecutive_errors,
                        "Predicate read failed, treating as unconfirmed"
                    );
                    false
                }
            };

            if confirmed {
                self.resolve(current).await;
                return;
            }

            debug!(
                task_id = %self.id,
                tick = %current,
                deadline = %self.deadline,
                remaining = current.ticks_until(self.deadline),
                "Not yet confirmed"
            );

            if !self.wait(&config, consecutive_errors, poll_started).await {
                self.abandon();
                return;
            }
        }
    }

    /// Woken by cancellation. A registration that slipped in while the
    /// monitor was shutting down is still Pending here and gets cleared.
    fn abandon(&self) {
        if self
            .inner
            .registry
            .transition(&self.id, self.generation, TaskStatus::Cancelled)
        {
            Metrics::task_finished(
                TaskStatus::Cancelled.as_str(),
                self.started.elapsed().as_millis() as f64,
            );
            self.inner.registry.remove(&self.id, self.generation);
            debug!(task_id = %self.id, "Task abandoned on shutdown");
        }
    }

    /// Sleep until the next poll. Returns false if the task was cancelled.
    ///
    /// A push hint cuts the wait short, but never closer than
    /// `min_poll_gap` to the previous poll. Hints are ignored while backing
    /// off from read errors.
    async fn wait(
        &mut self,
        config: &MonitorConfig,
        consecutive_errors: u32,
        last_poll: Instant,
    ) -> bool {
        let interval = config.backoff(consecutive_errors);
        let accept_hints = consecutive_errors == 0;

        let hinted = tokio::select! {
            biased;
            _ = self.wake.cancelled() => return false,
            _ = sleep(interval) => false,
            Ok(()) = self.hints.changed(), if accept_hints => true,
        };

        if hinted {
            debug!(task_id = %self.id, "Woken by push hint");
            tokio::select! {
                biased;
                _ = self.wake.cancelled() => return false,
                _ = sleep_until(last_poll + config.min_poll_gap()) => {}
            }
        }
        true
    }

    async fn resolve(&mut self, tick: Tick) {
        if !self
            .inner
            .registry
            .transition(&self.id, self.generation, TaskStatus::Resolved)
        {
            debug!(task_id = %self.id, "Confirmation discarded, task no longer pending");
            return;
        }

        let elapsed = self.started.elapsed();
        Metrics::task_finished(TaskStatus::Resolved.as_str(), elapsed.as_millis() as f64);
        info!(
            task_id = %self.id,
            intent = self.predicate.label(),
            tick = %tick,
            deadline = %self.deadline,
            elapsed_ms = elapsed.as_millis() as u64,
            "Task resolved"
        );

        if let Some(callback) = self.on_success.take() {
            run_callback(&self.id, "on_success", async move { callback().await }).await;
        }
        self.inner.registry.remove(&self.id, self.generation);
    }

    async fn expire(&mut self, reason: FailureReason) {
        if !self
            .inner
            .registry
            .transition(&self.id, self.generation, TaskStatus::Expired)
        {
            debug!(task_id = %self.id, "Expiry discarded, task no longer pending");
            return;
        }

        let elapsed = self.started.elapsed();
        Metrics::task_finished(TaskStatus::Expired.as_str(), elapsed.as_millis() as f64);
        warn!(
            task_id = %self.id,
            intent = self.predicate.label(),
            %reason,
            "Task expired"
        );

        if let Some(callback) = self.on_failure.take() {
            run_callback(&self.id, "on_failure", async move { callback(reason).await }).await;
        }
        self.inner.registry.remove(&self.id, self.generation);
    }
}

/// Run a terminal callback in its own task so a panic stays contained.
async fn run_callback<F>(task_id: &TaskId, which: &'static str, callback: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::spawn(callback).await {
        Ok(()) => {}
        Err(e) if e.is_panic() => {
            Metrics::callback_panicked();
            error!(task_id = %task_id, callback = which, "Task callback panicked");
        }
        Err(e) => {
            warn!(task_id = %task_id, callback = which, error = %e, "Task callback aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::FnPredicate;
    use qxmon_ledger::{LedgerError, MockLedger};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 1_000,
            min_poll_gap_ms: 100,
            error_backoff_max_ms: 4_000,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_ceiling_with_stalled_clock() {
        let ledger = Arc::new(MockLedger::at_tick(100));
        let config = MonitorConfig {
            max_wall_clock_ms: 5_000,
            ..fast_config()
        };
        let monitor = TaskMonitor::new(ledger, config).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let never = FnPredicate::new(|| async { Ok::<_, LedgerError>(false) });
        let request = MonitorRequest::new(never, Tick::new(200)).on_failure(move |reason| async move {
            let _ = tx.send(reason);
        });
        monitor.start_monitoring("stalled", request).unwrap();

        let reason = rx.recv().await.unwrap();
        assert!(matches!(
            reason,
            FailureReason::WallClockCeiling { elapsed } if elapsed >= Duration::from_secs(5)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_limit() {
        let ledger = Arc::new(MockLedger::at_tick(100));
        let config = MonitorConfig {
            max_polls: Some(3),
            ..fast_config()
        };
        let monitor = TaskMonitor::new(ledger.clone(), config).unwrap();
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = evaluations.clone();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let predicate = FnPredicate::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, LedgerError>(false) }
        });
        let request = MonitorRequest::new(predicate, Tick::new(200)).on_failure(move |reason| async move {
            let _ = tx.send(reason);
        });
        monitor.start_monitoring("capped", request).unwrap();

        assert_eq!(rx.recv().await.unwrap(), FailureReason::PollLimit { polls: 3 });
        assert_eq!(evaluations.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.tick_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_regression_does_not_disturb_polling() {
        let ledger = Arc::new(MockLedger::with_ticks([100, 102, 101, 103]));
        let monitor = TaskMonitor::new(ledger.clone(), fast_config()).unwrap();
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = evaluations.clone();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let predicate = FnPredicate::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, LedgerError>(false) }
        });
        let request = MonitorRequest::new(predicate, Tick::new(103)).on_failure(move |reason| async move {
            let _ = tx.send(reason);
        });
        monitor.start_monitoring("regress", request).unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            FailureReason::DeadlineReached {
                current: Tick::new(103),
                deadline: Tick::new(103),
            }
        );
        assert_eq!(evaluations.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.tick_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_with_cancelled_wake_never_polls() {
        let ledger = Arc::new(MockLedger::at_tick(100));
        let monitor = TaskMonitor::new(ledger.clone(), fast_config()).unwrap();
        let evaluations = Arc::new(AtomicUsize::new(0));
        let callbacks = Arc::new(AtomicUsize::new(0));

        // Shutdown has fired its token but not yet closed registration.
        monitor.inner.shutdown.cancel();

        let counter = evaluations.clone();
        let predicate = FnPredicate::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, LedgerError>(true) }
        });
        let on_success = callbacks.clone();
        let on_failure = callbacks.clone();
        let request = MonitorRequest::new(predicate, Tick::new(200))
            .on_success(move || async move {
                on_success.fetch_add(1, Ordering::SeqCst);
            })
            .on_failure(move |_| async move {
                on_failure.fetch_add(1, Ordering::SeqCst);
            });
        monitor.start_monitoring("late", request).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(evaluations.load(Ordering::SeqCst), 0);
        assert_eq!(callbacks.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.tick_calls(), 0);
        assert_eq!(monitor.status(&TaskId::from("late")), None);
        assert_eq!(monitor.pending_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let ledger = Arc::new(MockLedger::at_tick(1));
        let config = MonitorConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            TaskMonitor::new(ledger, config),
            Err(MonitorError::InvalidConfig(_))
        ));
    }
}
