//! Precision-safe decimal types for QX orders.
//!
//! QX prices and share counts are integers on-chain, but the query APIs
//! return them as JSON numbers or strings depending on the endpoint.
//! `rust_decimal` accepts both and compares by value, so `"100"` and
//! `100` match when predicates look for an order.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Price with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Whole-unit value as carried in a QX order payload.
    ///
    /// Fails for fractional or out-of-range prices.
    pub fn to_units(&self) -> Result<i64> {
        if !self.0.fract().is_zero() {
            return Err(CoreError::InvalidPrice(format!(
                "{} is not a whole number of units",
                self.0
            )));
        }
        self.0
            .to_i64()
            .ok_or_else(|| CoreError::InvalidPrice(format!("{} out of range", self.0)))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Price {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

/// Share quantity with exact decimal precision.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(pub Decimal);

impl Quantity {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Notional value in QU: quantity * price.
    #[inline]
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Quantity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<Decimal> for Quantity {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_equality_ignores_scale() {
        assert_eq!(Price::new(dec!(100)), Price::new(dec!(100.00)));
    }

    #[test]
    fn test_price_deserializes_number_and_string() {
        let from_num: Price = serde_json::from_str("250").unwrap();
        let from_str: Price = serde_json::from_str("\"250\"").unwrap();
        assert_eq!(from_num, from_str);
        assert_eq!(from_num, Price::from_units(250));
    }

    #[test]
    fn test_price_to_units_rejects_fraction() {
        assert_eq!(Price::from_units(42).to_units().unwrap(), 42);
        assert!(Price::new(dec!(1.5)).to_units().is_err());
    }

    #[test]
    fn test_notional_calculation() {
        let qty = Quantity::from_units(3);
        assert_eq!(qty.notional(Price::from_units(150)), dec!(450));
    }

    #[test]
    fn test_display_normalizes() {
        assert_eq!(Price::new(dec!(10.500)).to_string(), "10.5");
        assert_eq!(Quantity::new(dec!(7.0)).to_string(), "7");
    }
}
