//! Push wake-up signal.
//!
//! A hint says "ledger state probably changed, poll soon". It carries no
//! data and never resolves a task by itself: pollers that wake on a hint
//! still read authoritative state through the ledger traits.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

/// Cloneable handle that wakes every sleeping poller.
///
/// Backed by a `watch` channel holding a counter, so bursts of hints
/// coalesce into a single wake-up per poller.
#[derive(Debug, Clone)]
pub struct WakeHint {
    tx: Arc<watch::Sender<u64>>,
}

impl WakeHint {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Signal that ledger state may have changed.
    pub fn notify(&self) {
        self.tx.send_modify(|seq| *seq = seq.wrapping_add(1));
        trace!(seq = *self.tx.borrow(), "Wake hint sent");
    }

    /// Number of hints sent so far.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Receiver that observes hints sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for WakeHint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hints_coalesce() {
        let hint = WakeHint::new();
        let mut rx = hint.subscribe();

        hint.notify();
        hint.notify();
        hint.notify();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 3);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(hint.sequence(), 3);
    }

    #[test]
    fn test_notify_without_subscribers() {
        let hint = WakeHint::new();
        hint.notify();
        assert_eq!(hint.sequence(), 1);
    }
}
