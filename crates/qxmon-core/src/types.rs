//! Ledger state records as returned by the query APIs.

use serde::{Deserialize, Serialize};

use crate::decimal::{Price, Quantity};
use crate::order::EntityId;
use crate::tick::Tick;

/// A resting order on one side of an asset's book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookOrder {
    pub price: Price,
    #[serde(alias = "numberOfShares")]
    pub quantity: Quantity,
    #[serde(rename = "entityId", alias = "owner")]
    pub owner: EntityId,
}

impl BookOrder {
    /// Matching key used by confirmation predicates.
    pub fn matches(&self, price: Price, owner: &EntityId) -> bool {
        self.price == price && &self.owner == owner
    }
}

/// An executed trade involving an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub price: Price,
    #[serde(alias = "numberOfShares")]
    pub quantity: Quantity,
    #[serde(alias = "taker_wallet")]
    pub taker: EntityId,
    #[serde(default, alias = "maker_wallet")]
    pub maker: Option<EntityId>,
    #[serde(default, alias = "tickNumber")]
    pub tick: Option<Tick>,
    /// Not used for matching yet. Predicates key on `(price, owner)`, so two
    /// identical orders from one owner are indistinguishable until the
    /// backend echoes this reliably.
    #[serde(default, alias = "transactionHash")]
    pub tx_hash: Option<String>,
}

impl TradeRecord {
    /// True if `owner` was the taker of this trade at `price`.
    pub fn taken_by(&self, price: Price, owner: &EntityId) -> bool {
        self.price == price && &self.taker == owner
    }
}

/// Snapshot of the ledger clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInfo {
    pub tick: Tick,
    #[serde(default)]
    pub epoch: u32,
    #[serde(default, rename = "initialTick")]
    pub initial_tick: Tick,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_order_from_qx_api_shape() {
        let raw = r#"{"entityId":"OWNERID","price":"1200","numberOfShares":"3"}"#;
        let order: BookOrder = serde_json::from_str(raw).unwrap();
        assert_eq!(order.price, Price::from_units(1200));
        assert_eq!(order.quantity, Quantity::from_units(3));
        assert!(order.matches(Price::from_units(1200), &EntityId::new("OWNERID").unwrap()));
        assert!(!order.matches(Price::from_units(1201), &EntityId::new("OWNERID").unwrap()));
    }

    #[test]
    fn test_trade_record_from_backend_shape() {
        let raw = r#"{
            "trade_id": 7,
            "tx_hash": "abc",
            "taker_wallet": "TAKER",
            "maker_wallet": "MAKER",
            "price": "15",
            "quantity": "2",
            "type": "buy"
        }"#;
        let trade: TradeRecord = serde_json::from_str(raw).unwrap();
        assert!(trade.taken_by(Price::from_units(15), &EntityId::new("TAKER").unwrap()));
        assert!(!trade.taken_by(Price::from_units(15), &EntityId::new("MAKER").unwrap()));
        assert_eq!(trade.tx_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn test_tick_info_shape() {
        let raw = r#"{"tick": 18000123, "duration": 1, "epoch": 150, "initialTick": 18000000}"#;
        let info: TickInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.tick, Tick::new(18_000_123));
        assert_eq!(info.epoch, 150);
    }
}
