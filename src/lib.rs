//! # Spot Venue
//!
//! Single-asset trading venue: one in-memory price-time priority order book per market,
//! an HTTP/WebSocket surface, and asynchronous settlement of every match.
//!
//! ## Entry point
//!
//! [`Exchange`] owns the market registry. Build it once with [`Exchange::new`], share it as
//! `Arc<Exchange>`, and call [`Exchange::place_order`], [`Exchange::cancel_order`] and the
//! query methods. Matches are queued for settlement on a [`SettlementQueue`] drained by
//! [`run_settlement_worker`].
//!
//! ## Example
//!
//! ```rust
//! use spot_venue::{Exchange, MarketId, OrderType, PlaceOrderRequest, SettlementQueue, Side, AccountId};
//! use rust_decimal::Decimal;
//!
//! let (queue, _rx) = SettlementQueue::channel();
//! let exchange = Exchange::new([MarketId::new("ETH")], queue);
//! let resting = exchange
//!     .place_order(PlaceOrderRequest {
//!         account_id: AccountId(8),
//!         order_type: OrderType::Limit,
//!         side: Side::Ask,
//!         size: Decimal::from(10),
//!         price: Some(Decimal::from(100)),
//!         market: MarketId::new("ETH"),
//!     })
//!     .unwrap();
//! assert!(resting.matches.is_empty());
//! assert_eq!(exchange.best_ask(&MarketId::new("ETH")).unwrap(), Decimal::from(100));
//! ```
//!
//! ## Lower-level API
//!
//! [`OrderBook`] can be used directly for a single market without locking or settlement.

pub mod api;
pub mod book_side;
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod market_data_gen;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod settlement;
pub mod types;

pub use config::Config;
pub use error::{EngineError, ExchangeError, SettlementError};
pub use exchange::{Exchange, PlaceOrderRequest, PlaceOrderResponse};
pub use execution::{Match, Trade};
pub use market_data_gen::{replay_into_book, Generator, GeneratorConfig, OrderAction, ReplayOutcome};
pub use order_book::{BookSnapshot, LevelSnapshot, OrderBook, OrderView};
pub use settlement::{
    run_settlement_worker, Account, InMemoryLedger, Settlement, SettlementConfig,
    SettlementInstruction, SettlementQueue, SettlementStats, SettlementSummary,
};
pub use types::{AccountId, MarketId, Order, OrderId, OrderStatus, OrderType, Sequencer, Side};
