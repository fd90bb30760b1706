//! Core types and IDs for the venue.
//!
//! All identifiers are newtype wrappers. [`Order`] carries the mutable fill state that the
//! order book owns once the order is placed; everything handed back to callers is a clone.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique order identifier, assigned by [`Sequencer`] and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

/// Opaque account identifier of the submitting party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AccountId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Market identifier, e.g. `ETH`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MarketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// The side an incoming order of this side trades against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Order type: limit (rests at a price) or market (takes best available, never rests).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order lifecycle status.
///
/// `Filled` and `Canceled` are terminal: the order is gone from every book structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Resting,
    PartiallyFilled,
    Filled,
    Canceled,
}

/// One resting or incoming order.
///
/// `price` is `Some` only once the order rests as a limit order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub side: Side,
    /// Size at creation.
    pub size: Decimal,
    pub remaining_size: Decimal,
    /// Arrival sequence; strictly increasing per [`Sequencer`].
    pub created_at: u64,
    pub price: Option<Decimal>,
}

impl Order {
    pub fn filled_size(&self) -> Decimal {
        self.size - self.remaining_size
    }

    pub fn is_filled(&self) -> bool {
        self.remaining_size <= Decimal::ZERO
    }

    /// Status derived from fill state. Cancellation is reported by the book, not stored here.
    pub fn status(&self) -> OrderStatus {
        if self.is_filled() {
            OrderStatus::Filled
        } else if self.remaining_size < self.size {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Resting
        }
    }
}

/// Mints order ids and arrival sequence numbers.
///
/// Shared by every book of one exchange so ids stay unique across markets.
#[derive(Debug)]
pub struct Sequencer {
    next_order_id: AtomicU64,
    next_sequence: AtomicU64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            next_order_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn next_order_id(&self) -> OrderId {
        OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
