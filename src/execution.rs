//! Fills produced by matching.
//!
//! A [`Match`] is emitted for each execution of an incoming market order against one
//! resting order. It is final once emitted: settlement outcome never rewrites it.

use crate::types::{AccountId, MarketId, OrderId, Side};
use rust_decimal::Decimal;

/// One execution between a resting (maker) order and an incoming (taker) order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Match {
    /// Resting order's price.
    pub price: Decimal,
    pub size: Decimal,
    pub maker_order_id: OrderId,
    pub maker_account_id: AccountId,
    pub taker_order_id: OrderId,
    pub taker_account_id: AccountId,
    /// Side of the incoming order. The maker is always on the opposite side.
    pub taker_side: Side,
}

impl Match {
    pub fn maker_side(&self) -> Side {
        self.taker_side.opposite()
    }

    /// Order id of the buying party.
    pub fn bid_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::Bid => self.taker_order_id,
            Side::Ask => self.maker_order_id,
        }
    }

    /// Order id of the selling party.
    pub fn ask_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::Bid => self.maker_order_id,
            Side::Ask => self.taker_order_id,
        }
    }

    /// Account of the buying party (receives the asset on settlement).
    pub fn bid_account_id(&self) -> AccountId {
        match self.taker_side {
            Side::Bid => self.taker_account_id,
            Side::Ask => self.maker_account_id,
        }
    }

    /// Account of the selling party (sends the asset on settlement).
    pub fn ask_account_id(&self) -> AccountId {
        match self.taker_side {
            Side::Bid => self.maker_account_id,
            Side::Ask => self.taker_account_id,
        }
    }
}

/// A match as published on the trade feed and kept in the trade log.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub market: MarketId,
    /// Per-exchange trade sequence.
    pub sequence: u64,
    #[serde(flatten)]
    pub fill: Match,
}
