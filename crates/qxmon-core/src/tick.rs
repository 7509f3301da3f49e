//! Ledger tick arithmetic.
//!
//! A `Tick` is the ledger's logical clock. It is deliberately not
//! convertible to or from `std::time::Duration`: tick production rate
//! varies, so deadlines are expressed in ticks and polling cadence in
//! wall-clock durations, and the two never mix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Ledger tick number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Ticks remaining until `deadline` (0 once reached).
    #[inline]
    pub fn ticks_until(&self, deadline: Tick) -> u64 {
        deadline.0.saturating_sub(self.0)
    }

    /// True once this tick is at or past `deadline`.
    #[inline]
    pub fn has_reached(&self, deadline: Tick) -> bool {
        self.0 >= deadline.0
    }
}

impl Add<u64> for Tick {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl From<u32> for Tick {
    fn from(value: u32) -> Self {
        Self(u64::from(value))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_reached_is_inclusive() {
        let deadline = Tick::new(105);
        assert!(!Tick::new(104).has_reached(deadline));
        assert!(Tick::new(105).has_reached(deadline));
        assert!(Tick::new(200).has_reached(deadline));
    }

    #[test]
    fn test_ticks_until_saturates() {
        assert_eq!(Tick::new(100).ticks_until(Tick::new(110)), 10);
        assert_eq!(Tick::new(120).ticks_until(Tick::new(110)), 0);
    }

    #[test]
    fn test_add_saturates() {
        assert_eq!(Tick::new(u64::MAX) + 5, Tick::new(u64::MAX));
        assert_eq!(Tick::new(100) + 5, Tick::new(105));
    }
}
