//! Error types for the engine, the exchange, and settlement.

use crate::types::{AccountId, MarketId, OrderId, Side};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by a single order book. All are raised before any book mutation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),

    #[error("size must be positive, got {0}")]
    InvalidSize(Decimal),

    #[error("limit order requires a price")]
    MissingPrice,

    #[error("order {0} is already on the book")]
    DuplicateOrder(OrderId),

    #[error("order {0} has already been worked and cannot rest")]
    OrderNotFresh(OrderId),

    #[error("resting {size} more on the {side:?} side would overflow its total size")]
    SizeOverflow { side: Side, size: Decimal },

    #[error("no liquidity on the {0:?} side")]
    NoLiquidity(Side),
}

/// Errors raised by the exchange layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    #[error("market not found: {0}")]
    UnknownMarket(MarketId),

    #[error("account not found: {0}")]
    UnknownAccount(AccountId),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors reported by a settlement collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    #[error("no settlement address for account {0}")]
    UnknownAccount(AccountId),

    #[error("insufficient funds at {address}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        address: String,
        balance: Decimal,
        needed: Decimal,
    },

    #[error("transfer timed out after {0} ms")]
    Timeout(u64),

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

impl SettlementError {
    /// Whether resubmitting the same transfer could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::Timeout(_) | SettlementError::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_converts_into_exchange_error() {
        let err: ExchangeError = EngineError::NoLiquidity(Side::Bid).into();
        assert_eq!(err.to_string(), "no liquidity on the Bid side");
    }

    #[test]
    fn only_transient_settlement_errors_are_retryable() {
        assert!(SettlementError::Timeout(10).is_retryable());
        assert!(SettlementError::Rejected("nonce too low".into()).is_retryable());
        assert!(!SettlementError::UnknownAccount(AccountId(1)).is_retryable());
        assert!(!SettlementError::InsufficientFunds {
            address: "0x1".into(),
            balance: Decimal::ONE,
            needed: Decimal::TWO,
        }
        .is_retryable());
    }
}
