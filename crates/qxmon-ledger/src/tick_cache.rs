//! Shared, monotonic tick clock.
//!
//! Every pending monitor task asks for the current tick once per poll. With
//! many tasks in flight that would hammer the RPC, so [`CachedTickClock`]
//! serves a reading younger than its TTL and coalesces concurrent refreshes
//! into one request. It also never lets the observed tick go backwards,
//! which can happen when consecutive requests land on different RPC nodes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use qxmon_core::Tick;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::LedgerResult;
use crate::source::{BoxFuture, DynTickClock, TickClock};

/// Tick clock wrapper with TTL caching and monotonic output.
pub struct CachedTickClock {
    inner: DynTickClock,
    ttl: Duration,
    /// Last reading and when it was taken. Held across the refresh await
    /// so concurrent callers wait for one request instead of issuing many.
    last: Mutex<Option<(Tick, Instant)>>,
    /// Highest tick ever returned.
    highest: AtomicU64,
}

impl CachedTickClock {
    #[must_use]
    pub fn new(inner: DynTickClock, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            last: Mutex::new(None),
            highest: AtomicU64::new(0),
        }
    }

    /// Highest tick observed so far (0 before the first read).
    #[must_use]
    pub fn highest_seen(&self) -> Tick {
        Tick::new(self.highest.load(Ordering::Acquire))
    }

    async fn read(&self) -> LedgerResult<Tick> {
        let mut last = self.last.lock().await;

        if let Some((tick, at)) = *last {
            if at.elapsed() < self.ttl {
                return Ok(tick);
            }
        }

        let fetched = self.inner.current_tick().await?;
        let previous = self.highest.fetch_max(fetched.value(), Ordering::AcqRel);
        let tick = if fetched.value() < previous {
            warn!(fetched = %fetched, highest = previous, "Tick clock went backwards, keeping highest");
            Tick::new(previous)
        } else {
            fetched
        };

        debug!(tick = %tick, "Tick refreshed");
        *last = Some((tick, Instant::now()));
        Ok(tick)
    }
}

impl TickClock for CachedTickClock {
    fn current_tick(&self) -> BoxFuture<'_, LedgerResult<Tick>> {
        Box::pin(self.read())
    }
}
