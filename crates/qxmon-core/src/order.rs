//! Order intents and identifiers.
//!
//! An [`OrderIntent`] is what a signed QX transaction is supposed to do:
//! add or remove a bid/ask at a price for an owner. Confirmation works on
//! intents, not on transaction hashes, because the ledger read API only
//! exposes order-book and trade state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::{Price, Quantity};
use crate::error::{CoreError, Result};

/// Order-book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// QX order procedure carried by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderAction {
    AddBid,
    AddAsk,
    RemoveBid,
    RemoveAsk,
}

impl OrderAction {
    /// QX contract input type for this procedure.
    pub fn input_type(&self) -> u16 {
        match self {
            Self::AddAsk => 5,
            Self::AddBid => 6,
            Self::RemoveAsk => 7,
            Self::RemoveBid => 8,
        }
    }

    /// Inverse of [`input_type`](Self::input_type).
    pub fn from_input_type(input_type: u16) -> Option<Self> {
        match input_type {
            5 => Some(Self::AddAsk),
            6 => Some(Self::AddBid),
            7 => Some(Self::RemoveAsk),
            8 => Some(Self::RemoveBid),
            _ => None,
        }
    }

    /// Book side the action touches.
    pub fn side(&self) -> BookSide {
        match self {
            Self::AddBid | Self::RemoveBid => BookSide::Bid,
            Self::AddAsk | Self::RemoveAsk => BookSide::Ask,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::RemoveBid | Self::RemoveAsk)
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddBid => write!(f, "add_bid"),
            Self::AddAsk => write!(f, "add_ask"),
            Self::RemoveBid => write!(f, "remove_bid"),
            Self::RemoveAsk => write!(f, "remove_ask"),
        }
    }
}

/// How a placed order is expected to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Rests on the book.
    Maker,
    /// Executes immediately against a resting order.
    #[default]
    Taker,
}

/// Ledger identity of an order owner or asset issuer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an entity id, rejecting blank input.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidEntity("empty identity".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An issued asset: issuer identity plus asset name (max 7 chars on QX).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub issuer: EntityId,
    pub name: String,
}

impl AssetKey {
    /// Maximum asset name length on QX.
    pub const MAX_NAME_LEN: usize = 7;

    pub fn new(issuer: EntityId, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > Self::MAX_NAME_LEN || !name.is_ascii() {
            return Err(CoreError::InvalidAssetName(name));
        }
        Ok(Self { issuer, name })
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// What a broadcast QX order transaction intends to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub asset: AssetKey,
    pub action: OrderAction,
    pub price: Price,
    pub quantity: Quantity,
    pub owner: EntityId,
    /// Only meaningful for add actions.
    pub fill: FillMode,
}

impl OrderIntent {
    /// Short label used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match (self.action, self.fill) {
            (OrderAction::RemoveBid, _) => "remove_bid",
            (OrderAction::RemoveAsk, _) => "remove_ask",
            (_, FillMode::Maker) => "maker",
            (_, FillMode::Taker) => "taker",
        }
    }
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}@{} ({})",
            self.action,
            self.asset,
            self.quantity,
            self.price,
            self.kind()
        )
    }
}

/// Caller-supplied monitor task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a unique id with the given prefix.
    ///
    /// Format: `{prefix}-{timestamp_ms}-{uuid_short}`
    pub fn generate(prefix: &str) -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("{prefix}-{ts}-{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
