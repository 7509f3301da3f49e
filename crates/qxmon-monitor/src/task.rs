//! Monitor task types.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use qxmon_core::Tick;
use qxmon_ledger::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::predicate::ConfirmationPredicate;

/// Lifecycle state of a monitor task.
///
/// `Pending` is the only non-terminal state. Transitions out of it happen
/// at most once per registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Resolved,
    Expired,
    Cancelled,
}

impl TaskStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The ledger clock reached the deadline tick before confirmation.
    DeadlineReached { current: Tick, deadline: Tick },
    /// The tick clock never reached the deadline within the wall-clock
    /// ceiling.
    WallClockCeiling { elapsed: Duration },
    /// The configured poll cap was hit.
    PollLimit { polls: u32 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadlineReached { current, deadline } => {
                write!(f, "deadline tick {deadline} reached at tick {current}")
            }
            Self::WallClockCeiling { elapsed } => {
                write!(f, "wall-clock ceiling reached after {}ms", elapsed.as_millis())
            }
            Self::PollLimit { polls } => write!(f, "poll limit reached after {polls} polls"),
        }
    }
}

/// How a task left the Pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Resolved,
    Expired(FailureReason),
    Cancelled,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Resolved => TaskStatus::Resolved,
            Self::Expired(_) => TaskStatus::Expired,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }
}

pub(crate) type SuccessCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;
pub(crate) type FailureCallback = Box<dyn FnOnce(FailureReason) -> BoxFuture<'static, ()> + Send>;

/// Everything needed to monitor one transaction.
///
/// ```ignore
/// let request = MonitorRequest::new(predicate, tx_tick + 5)
///     .on_success(|| async { info!("confirmed") })
///     .on_failure(|reason| async move { warn!(%reason, "expired") });
/// monitor.start_monitoring("place-order-CFB-5-10-1700000000000", request)?;
/// ```
pub struct MonitorRequest {
    pub(crate) predicate: Arc<dyn ConfirmationPredicate>,
    pub(crate) deadline: Tick,
    pub(crate) on_success: Option<SuccessCallback>,
    pub(crate) on_failure: Option<FailureCallback>,
}

impl MonitorRequest {
    pub fn new(predicate: impl ConfirmationPredicate + 'static, deadline: Tick) -> Self {
        Self::from_arc(Arc::new(predicate), deadline)
    }

    pub fn from_arc(predicate: Arc<dyn ConfirmationPredicate>, deadline: Tick) -> Self {
        Self {
            predicate,
            deadline,
            on_success: None,
            on_failure: None,
        }
    }

    /// Invoked once when the predicate confirms before the deadline.
    #[must_use]
    pub fn on_success<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_success = Some(Box::new(move || -> BoxFuture<'static, ()> {
            Box::pin(callback())
        }));
        self
    }

    /// Invoked once when the task expires.
    #[must_use]
    pub fn on_failure<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce(FailureReason) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_failure = Some(Box::new(move |reason| -> BoxFuture<'static, ()> {
            Box::pin(callback(reason))
        }));
        self
    }

    pub fn deadline(&self) -> Tick {
        self.deadline
    }
}

impl fmt::Debug for MonitorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorRequest")
            .field("intent", &self.predicate.label())
            .field("deadline", &self.deadline)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Resolved.is_terminal());
        assert!(TaskStatus::Expired.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::DeadlineReached {
            current: Tick::new(106),
            deadline: Tick::new(105),
        };
        assert_eq!(reason.to_string(), "deadline tick 105 reached at tick 106");
        assert_eq!(
            FailureReason::PollLimit { polls: 3 }.to_string(),
            "poll limit reached after 3 polls"
        );
    }

    #[test]
    fn test_outcome_status() {
        let expired = TaskOutcome::Expired(FailureReason::PollLimit { polls: 1 });
        assert_eq!(expired.status(), TaskStatus::Expired);
        assert_eq!(TaskOutcome::Resolved.status(), TaskStatus::Resolved);
        assert!(TaskOutcome::Cancelled.status().is_terminal());
    }
}
