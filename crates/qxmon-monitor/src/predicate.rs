//! Confirmation predicates.
//!
//! A predicate answers one question on each poll: is the transaction's
//! intended effect visible on the ledger yet? It reads fresh state every
//! time and keeps nothing between calls. An `Err` is inconclusive and the
//! poll loop treats it as "not yet".

use std::future::Future;

use qxmon_core::{FillMode, OrderIntent};
use qxmon_ledger::{BoxFuture, DynLedgerReader, LedgerResult};

/// Idempotent ledger check for a single intent.
pub trait ConfirmationPredicate: Send + Sync {
    fn evaluate(&self) -> BoxFuture<'_, LedgerResult<bool>>;

    /// Short label for logs and metrics.
    fn label(&self) -> &'static str {
        "custom"
    }
}

/// Predicate derived from a QX order intent.
///
/// | intent | confirmed when |
/// |---|---|
/// | add, maker | an order with the intent's (price, owner) rests on that side |
/// | add, taker | a trade exists at that price with the owner as taker |
/// | remove bid/ask | no order with that (price, owner) rests on that side |
pub struct IntentPredicate {
    intent: OrderIntent,
    ledger: DynLedgerReader,
}

impl IntentPredicate {
    pub fn new(intent: OrderIntent, ledger: DynLedgerReader) -> Self {
        Self { intent, ledger }
    }

    pub fn intent(&self) -> &OrderIntent {
        &self.intent
    }

    async fn check(&self) -> LedgerResult<bool> {
        let intent = &self.intent;
        let side = intent.action.side();

        if intent.action.is_removal() {
            let book = self.ledger.orders(&intent.asset, side).await?;
            return Ok(!book.iter().any(|o| o.matches(intent.price, &intent.owner)));
        }

        match intent.fill {
            FillMode::Maker => {
                let book = self.ledger.orders(&intent.asset, side).await?;
                Ok(book.iter().any(|o| o.matches(intent.price, &intent.owner)))
            }
            FillMode::Taker => {
                let trades = self.ledger.trades(&intent.owner).await?;
                Ok(trades
                    .iter()
                    .any(|t| t.taken_by(intent.price, &intent.owner)))
            }
        }
    }
}

impl ConfirmationPredicate for IntentPredicate {
    fn evaluate(&self) -> BoxFuture<'_, LedgerResult<bool>> {
        Box::pin(self.check())
    }

    fn label(&self) -> &'static str {
        self.intent.kind()
    }
}

/// Adapter turning an async closure into a predicate.
pub struct FnPredicate<F> {
    check: F,
    label: &'static str,
}

impl<F, Fut> FnPredicate<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = LedgerResult<bool>> + Send + 'static,
{
    pub fn new(check: F) -> Self {
        Self {
            check,
            label: "custom",
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}

impl<F, Fut> ConfirmationPredicate for FnPredicate<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = LedgerResult<bool>> + Send + 'static,
{
    fn evaluate(&self) -> BoxFuture<'_, LedgerResult<bool>> {
        Box::pin((self.check)())
    }

    fn label(&self) -> &'static str {
        self.label
    }
}
