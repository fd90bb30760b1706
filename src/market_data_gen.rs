//! Synthetic order flow.
//!
//! Deterministic, configurable stream of [`OrderAction`]s for replay tests, benches and load
//! tests. Same config and seed ⇒ same stream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::exchange::PlaceOrderRequest;
use crate::execution::Match;
use crate::order_book::OrderBook;
use crate::types::{AccountId, MarketId, Order, OrderId, OrderType, Side};

/// Configuration for the synthetic generator. All ranges are inclusive.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// RNG seed. Same seed ⇒ same stream.
    pub seed: u64,
    /// Number of actions produced by [`Generator::all_actions`].
    pub num_actions: usize,
    /// Probability of Bid (0.0..=1.0). Ask otherwise.
    pub bid_ratio: f64,
    /// Probability that a placement is a limit order. Market otherwise.
    pub limit_ratio: f64,
    /// Probability of cancelling an earlier limit order instead of placing.
    pub cancel_ratio: f64,
    pub price_min: i64,
    pub price_max: i64,
    /// Size range in whole units.
    pub size_min: u64,
    pub size_max: u64,
    /// Accounts are drawn from `1..=num_accounts`.
    pub num_accounts: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_actions: 1000,
            bid_ratio: 0.5,
            limit_ratio: 0.7,
            cancel_ratio: 0.1,
            price_min: 95,
            price_max: 105,
            size_min: 1,
            size_max: 100,
            num_accounts: 5,
        }
    }
}

/// One step of synthetic order flow.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderAction {
    Limit {
        account_id: AccountId,
        side: Side,
        size: Decimal,
        price: Decimal,
    },
    Market {
        account_id: AccountId,
        side: Side,
        size: Decimal,
    },
    /// Cancels the `nth` limit order of the stream (0-based). It may already be filled.
    Cancel { nth: usize },
}

impl OrderAction {
    /// Placement request for `market`; `None` for cancels.
    pub fn to_request(&self, market: &MarketId) -> Option<PlaceOrderRequest> {
        match *self {
            OrderAction::Limit {
                account_id,
                side,
                size,
                price,
            } => Some(PlaceOrderRequest {
                account_id,
                order_type: OrderType::Limit,
                side,
                size,
                price: Some(price),
                market: market.clone(),
            }),
            OrderAction::Market {
                account_id,
                side,
                size,
            } => Some(PlaceOrderRequest {
                account_id,
                order_type: OrderType::Market,
                side,
                size,
                price: None,
                market: market.clone(),
            }),
            OrderAction::Cancel { .. } => None,
        }
    }
}

/// Deterministic action stream.
pub struct Generator {
    rng: StdRng,
    config: GeneratorConfig,
    limits_emitted: usize,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            rng,
            config,
            limits_emitted: 0,
        }
    }

    pub fn next_action(&mut self) -> OrderAction {
        if self.limits_emitted > 0 && self.rng.gen::<f64>() < self.config.cancel_ratio {
            let nth = self.rng.gen_range(0..self.limits_emitted);
            return OrderAction::Cancel { nth };
        }
        let side = if self.rng.gen::<f64>() < self.config.bid_ratio {
            Side::Bid
        } else {
            Side::Ask
        };
        let size = Decimal::from(
            self.rng
                .gen_range(self.config.size_min.max(1)..=self.config.size_max.max(1)),
        );
        let account_id = AccountId(self.rng.gen_range(1..=self.config.num_accounts.max(1)));
        if self.rng.gen::<f64>() < self.config.limit_ratio {
            let price = Decimal::from(
                self.rng
                    .gen_range(self.config.price_min.max(1)..=self.config.price_max.max(1)),
            );
            self.limits_emitted += 1;
            OrderAction::Limit {
                account_id,
                side,
                size,
                price,
            }
        } else {
            OrderAction::Market {
                account_id,
                side,
                size,
            }
        }
    }

    pub fn take_actions(&mut self, n: usize) -> Vec<OrderAction> {
        (0..n).map(|_| self.next_action()).collect()
    }

    /// The full stream as defined by `config.num_actions`.
    pub fn all_actions(&mut self) -> Vec<OrderAction> {
        self.take_actions(self.config.num_actions)
    }
}

/// What a replay did to the book.
#[derive(Clone, Debug, Default)]
pub struct ReplayOutcome {
    /// Placed limit orders as created, in stream order.
    pub limit_orders: Vec<Order>,
    /// Market orders in their final state; `remaining_size` is the discarded remainder.
    pub market_orders: Vec<Order>,
    /// Orders removed by cancels, with the size they still had.
    pub canceled: Vec<Order>,
    pub matches: Vec<Match>,
    /// Cancels that found nothing to remove.
    pub cancel_misses: usize,
}

impl ReplayOutcome {
    pub fn limit_order_ids(&self) -> Vec<OrderId> {
        self.limit_orders.iter().map(|o| o.id).collect()
    }
}

/// Replays actions into `book`, stopping at the first rejected placement.
pub fn replay_into_book(
    book: &mut OrderBook,
    actions: impl IntoIterator<Item = OrderAction>,
) -> Result<ReplayOutcome, EngineError> {
    let mut outcome = ReplayOutcome::default();
    for action in actions {
        match action {
            OrderAction::Limit {
                account_id,
                side,
                size,
                price,
            } => {
                let order = book.create_order(side, size, account_id)?;
                book.place_limit(order.clone(), price)?;
                outcome.limit_orders.push(order);
            }
            OrderAction::Market {
                account_id,
                side,
                size,
            } => {
                let mut order = book.create_order(side, size, account_id)?;
                let matches = book.place_market(&mut order)?;
                outcome.matches.extend(matches);
                outcome.market_orders.push(order);
            }
            OrderAction::Cancel { nth } => {
                let removed = outcome
                    .limit_orders
                    .get(nth)
                    .and_then(|o| book.remove_order(o.id));
                match removed {
                    Some(order) => outcome.canceled.push(order),
                    None => outcome.cancel_misses += 1,
                }
            }
        }
    }
    Ok(outcome)
}
