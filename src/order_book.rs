//! Single-market order book: bids, asks and the order-id index.
//!
//! Limit orders only rest; they are never matched on arrival, even when their price crosses
//! the opposite best. Market orders match immediately through [`crate::matching`] and never
//! rest. Every mutation keeps the index and the two sides in agreement.

use crate::book_side::BookSide;
use crate::error::EngineError;
use crate::execution::Match;
use crate::matching::match_market;
use crate::types::{AccountId, MarketId, Order, OrderId, Sequencer, Side};
use log::{info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Locates a resting order: its side, its level, and its slot within the level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderHandle {
    pub side: Side,
    pub price: Decimal,
    pub slot: u64,
}

/// One resting order as exposed in a snapshot.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrderView {
    pub id: OrderId,
    pub account_id: AccountId,
    pub side: Side,
    pub size: Decimal,
    pub created_at: u64,
}

/// One price level as exposed in a snapshot, orders in time priority.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LevelSnapshot {
    pub price: Decimal,
    pub total_size: Decimal,
    pub orders: Vec<OrderView>,
}

/// Full depth of one book, each side best-first.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BookSnapshot {
    pub market: MarketId,
    pub bid_volume: Decimal,
    pub ask_volume: Decimal,
    pub bids: Vec<LevelSnapshot>,
    pub asks: Vec<LevelSnapshot>,
}

/// Single-market order book.
#[derive(Debug)]
pub struct OrderBook {
    market: MarketId,
    bids: BookSide,
    asks: BookSide,
    index: HashMap<OrderId, OrderHandle>,
    sequencer: Arc<Sequencer>,
    next_slot: u64,
}

impl OrderBook {
    /// Creates an empty book with its own id sequence.
    pub fn new(market: MarketId) -> Self {
        Self::with_sequencer(market, Arc::new(Sequencer::new()))
    }

    /// Creates an empty book drawing ids from a shared sequence.
    pub fn with_sequencer(market: MarketId, sequencer: Arc<Sequencer>) -> Self {
        Self {
            market,
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            index: HashMap::new(),
            sequencer,
            next_slot: 0,
        }
    }

    pub fn market(&self) -> &MarketId {
        &self.market
    }

    /// Mints an order with a fresh id and arrival sequence. Does not place it.
    pub fn create_order(
        &self,
        side: Side,
        size: Decimal,
        account_id: AccountId,
    ) -> Result<Order, EngineError> {
        if size <= Decimal::ZERO {
            return Err(EngineError::InvalidSize(size));
        }
        Ok(Order {
            id: self.sequencer.next_order_id(),
            account_id,
            side,
            size,
            remaining_size: size,
            created_at: self.sequencer.next_sequence(),
            price: None,
        })
    }

    /// Rests `order` at `price` at the tail of that level. Never matches.
    ///
    /// `order` must be fresh from [`OrderBook::create_order`]: untouched by any fill and not
    /// yet priced.
    pub fn place_limit(&mut self, mut order: Order, price: Decimal) -> Result<(), EngineError> {
        if price <= Decimal::ZERO {
            return Err(EngineError::InvalidPrice(price));
        }
        if order.remaining_size <= Decimal::ZERO {
            return Err(EngineError::InvalidSize(order.remaining_size));
        }
        if self.index.contains_key(&order.id) {
            return Err(EngineError::DuplicateOrder(order.id));
        }
        if order.remaining_size != order.size || order.price.is_some() {
            return Err(EngineError::OrderNotFresh(order.id));
        }
        if !self.side(order.side).has_room_for(order.remaining_size) {
            return Err(EngineError::SizeOverflow {
                side: order.side,
                size: order.remaining_size,
            });
        }
        info!(
            "limit order placed market={} order_id={} account={} side={:?} size={} price={}",
            self.market, order.id, order.account_id, order.side, order.remaining_size, price
        );
        order.price = Some(price);
        let slot = self.next_slot;
        self.next_slot += 1;
        let handle = OrderHandle {
            side: order.side,
            price,
            slot,
        };
        let order_id = order.id;
        self.side_mut(handle.side).insert(price, slot, order);
        self.index.insert(order_id, handle);
        self.debug_check();
        Ok(())
    }

    /// Matches `order` against the opposite side; the unfilled remainder is discarded.
    ///
    /// On return `order.remaining_size` holds what could not be filled.
    pub fn place_market(&mut self, order: &mut Order) -> Result<Vec<Match>, EngineError> {
        if order.remaining_size <= Decimal::ZERO {
            return Err(EngineError::InvalidSize(order.remaining_size));
        }
        if self.index.contains_key(&order.id) {
            return Err(EngineError::DuplicateOrder(order.id));
        }
        let opposite = match order.side {
            Side::Bid => &mut self.asks,
            Side::Ask => &mut self.bids,
        };
        let matches = match_market(opposite, &mut self.index, order);
        let filled: Decimal = matches.iter().map(|m| m.size).sum();
        info!(
            "market order filled market={} order_id={} side={:?} filled={} matches={}",
            self.market,
            order.id,
            order.side,
            filled,
            matches.len()
        );
        if order.remaining_size > Decimal::ZERO {
            warn!(
                "market order remainder discarded market={} order_id={} unfilled={}",
                self.market, order.id, order.remaining_size
            );
        }
        self.debug_check();
        Ok(matches)
    }

    /// Cancels a resting order. Returns `false` if it is unknown, filled or already canceled.
    pub fn cancel(&mut self, order_id: OrderId) -> bool {
        self.remove_order(order_id).is_some()
    }

    /// Removes a resting order and returns its last state.
    pub fn remove_order(&mut self, order_id: OrderId) -> Option<Order> {
        let handle = self.index.remove(&order_id)?;
        let removed = self.side_mut(handle.side).remove(handle.price, handle.slot);
        debug_assert!(
            removed.is_some(),
            "indexed order {} missing from its level",
            order_id
        );
        if let Some(order) = &removed {
            info!(
                "order canceled market={} order_id={} unfilled={}",
                self.market, order_id, order.remaining_size
            );
        }
        self.debug_check();
        removed
    }

    /// Snapshot of a resting order.
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        let handle = self.index.get(&order_id)?;
        self.side(handle.side)
            .level(handle.price)?
            .get(handle.slot)
            .cloned()
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best_price()
    }

    /// Best ask minus best bid. Needs liquidity on both sides.
    pub fn spread(&self) -> Result<Decimal, EngineError> {
        let bid = self.best_bid().ok_or(EngineError::NoLiquidity(Side::Bid))?;
        let ask = self.best_ask().ok_or(EngineError::NoLiquidity(Side::Ask))?;
        Ok(ask - bid)
    }

    pub fn bid_volume(&self) -> Decimal {
        self.bids.volume()
    }

    pub fn ask_volume(&self) -> Decimal {
        self.asks.volume()
    }

    /// Number of resting orders on both sides.
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            market: self.market.clone(),
            bid_volume: self.bids.volume(),
            ask_volume: self.asks.volume(),
            bids: side_snapshot(&self.bids),
            asks: side_snapshot(&self.asks),
        }
    }

    /// Verifies that index and sides hold the same orders and that all cached totals agree.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut walked = 0usize;
        for side in [&self.bids, &self.asks] {
            let mut volume = Decimal::ZERO;
            let mut count = 0usize;
            for level in side.levels() {
                if level.is_empty() {
                    return Err(format!("empty level at {} on {:?}", level.price(), side.side()));
                }
                let mut sum = Decimal::ZERO;
                for (slot, order) in level.slots() {
                    if order.remaining_size <= Decimal::ZERO {
                        return Err(format!("order {} rests with no size", order.id));
                    }
                    if order.side != side.side() || order.price != Some(level.price()) {
                        return Err(format!("order {} sits on the wrong side or level", order.id));
                    }
                    let expected = OrderHandle {
                        side: side.side(),
                        price: level.price(),
                        slot,
                    };
                    if self.index.get(&order.id) != Some(&expected) {
                        return Err(format!("order {} not indexed at its location", order.id));
                    }
                    sum += order.remaining_size;
                    count += 1;
                }
                if sum != level.total_size() {
                    return Err(format!(
                        "level {} total {} != sum {}",
                        level.price(),
                        level.total_size(),
                        sum
                    ));
                }
                volume += sum;
            }
            if volume != side.volume() || count != side.order_count() {
                return Err(format!("{:?} side totals out of date", side.side()));
            }
            walked += count;
        }
        if walked != self.index.len() {
            return Err(format!(
                "index holds {} orders but levels hold {}",
                self.index.len(),
                walked
            ));
        }
        Ok(())
    }

    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            if let Err(violation) = self.check_invariants() {
                panic!("order book invariant violated: {}", violation);
            }
        }
    }

    fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }
}

fn side_snapshot(side: &BookSide) -> Vec<LevelSnapshot> {
    side.levels()
        .map(|level| LevelSnapshot {
            price: level.price(),
            total_size: level.total_size(),
            orders: level
                .iter()
                .map(|o| OrderView {
                    id: o.id,
                    account_id: o.account_id,
                    side: o.side,
                    size: o.remaining_size,
                    created_at: o.created_at,
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook::new(MarketId::new("ETH"))
    }

    fn limit(book: &mut OrderBook, side: Side, size: i64, price: i64, account: u64) -> OrderId {
        let order = book
            .create_order(side, Decimal::from(size), AccountId(account))
            .unwrap();
        let id = order.id;
        book.place_limit(order, Decimal::from(price)).unwrap();
        id
    }

    fn market(book: &mut OrderBook, side: Side, size: i64, account: u64) -> (Order, Vec<Match>) {
        let mut order = book
            .create_order(side, Decimal::from(size), AccountId(account))
            .unwrap();
        let matches = book.place_market(&mut order).unwrap();
        (order, matches)
    }

    #[test]
    fn limit_ask_sets_best_ask_and_volume() {
        let mut ob = book();
        limit(&mut ob, Side::Ask, 10, 100, 1);
        assert_eq!(ob.best_ask(), Some(Decimal::from(100)));
        assert_eq!(ob.ask_volume(), Decimal::from(10));
        assert_eq!(ob.best_bid(), None);
        ob.check_invariants().unwrap();
    }

    #[test]
    fn market_ask_walks_bids_best_first() {
        let mut ob = book();
        limit(&mut ob, Side::Bid, 5, 90, 1);
        limit(&mut ob, Side::Bid, 5, 95, 1);
        let (order, matches) = market(&mut ob, Side::Ask, 7, 2);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].price, Decimal::from(95));
        assert_eq!(matches[0].size, Decimal::from(5));
        assert_eq!(matches[1].price, Decimal::from(90));
        assert_eq!(matches[1].size, Decimal::from(2));
        assert_eq!(ob.bid_volume(), Decimal::from(3));
        assert_eq!(order.remaining_size, Decimal::ZERO);
        ob.check_invariants().unwrap();
    }

    #[test]
    fn same_price_fills_earlier_order_first() {
        let mut ob = book();
        let a = limit(&mut ob, Side::Ask, 10, 100, 1);
        let b = limit(&mut ob, Side::Ask, 10, 100, 2);
        let (_, matches) = market(&mut ob, Side::Bid, 12, 3);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].maker_order_id, a);
        assert_eq!(matches[0].size, Decimal::from(10));
        assert_eq!(matches[1].maker_order_id, b);
        assert_eq!(matches[1].size, Decimal::from(2));
        assert!(!ob.contains(a));
        assert_eq!(ob.order(b).unwrap().remaining_size, Decimal::from(8));
        ob.check_invariants().unwrap();
    }

    #[test]
    fn market_remainder_is_discarded() {
        let mut ob = book();
        limit(&mut ob, Side::Ask, 10, 100, 1);
        limit(&mut ob, Side::Ask, 20, 101, 1);
        let (order, matches) = market(&mut ob, Side::Bid, 50, 2);
        let filled: Decimal = matches.iter().map(|m| m.size).sum();
        assert!(matches.len() >= 2);
        assert_eq!(filled, Decimal::from(30));
        assert_eq!(order.remaining_size, Decimal::from(20));
        assert!(ob.is_empty());
        assert_eq!(ob.best_bid(), None, "market remainder never rests");
        ob.check_invariants().unwrap();
    }

    #[test]
    fn market_order_on_empty_side_returns_no_matches() {
        let mut ob = book();
        limit(&mut ob, Side::Bid, 1, 10, 1);
        let (order, matches) = market(&mut ob, Side::Bid, 5, 2);
        assert!(matches.is_empty());
        assert_eq!(order.remaining_size, Decimal::from(5));
        assert_eq!(ob.bid_volume(), Decimal::ONE);
    }

    #[test]
    fn cancel_of_filled_order_is_noop() {
        let mut ob = book();
        let id = limit(&mut ob, Side::Ask, 5, 100, 1);
        limit(&mut ob, Side::Ask, 5, 101, 1);
        market(&mut ob, Side::Bid, 5, 2);
        let before = ob.snapshot();
        assert!(!ob.cancel(id));
        assert_eq!(ob.snapshot(), before);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut ob = book();
        let id = limit(&mut ob, Side::Bid, 4, 99, 1);
        limit(&mut ob, Side::Bid, 6, 99, 1);
        assert!(ob.cancel(id));
        assert!(!ob.cancel(id));
        assert_eq!(ob.bid_volume(), Decimal::from(6));
        assert_eq!(ob.snapshot().bids[0].orders.len(), 1);
        ob.check_invariants().unwrap();
    }

    #[test]
    fn cancel_partially_filled_order_releases_remaining_size() {
        let mut ob = book();
        let id = limit(&mut ob, Side::Ask, 10, 100, 1);
        market(&mut ob, Side::Bid, 4, 2);
        let removed = ob.remove_order(id).unwrap();
        assert_eq!(removed.remaining_size, Decimal::from(6));
        assert_eq!(ob.ask_volume(), Decimal::ZERO);
        assert_eq!(ob.best_ask(), None);
    }

    #[test]
    fn crossing_limit_rests_without_matching() {
        let mut ob = book();
        limit(&mut ob, Side::Ask, 5, 100, 1);
        limit(&mut ob, Side::Bid, 5, 105, 2);
        assert_eq!(ob.best_bid(), Some(Decimal::from(105)));
        assert_eq!(ob.best_ask(), Some(Decimal::from(100)));
        assert_eq!(ob.order_count(), 2);
    }

    #[test]
    fn invalid_input_rejected_before_mutation() {
        let mut ob = book();
        assert_eq!(
            ob.create_order(Side::Bid, Decimal::ZERO, AccountId(1)),
            Err(EngineError::InvalidSize(Decimal::ZERO))
        );
        let order = ob.create_order(Side::Bid, Decimal::ONE, AccountId(1)).unwrap();
        assert_eq!(
            ob.place_limit(order.clone(), Decimal::from(-1)),
            Err(EngineError::InvalidPrice(Decimal::from(-1)))
        );
        assert!(ob.is_empty());
        ob.place_limit(order.clone(), Decimal::from(10)).unwrap();
        assert_eq!(
            ob.place_limit(order.clone(), Decimal::from(11)),
            Err(EngineError::DuplicateOrder(order.id))
        );
        assert_eq!(ob.order_count(), 1);
    }

    #[test]
    fn oversized_limit_rejected_without_touching_book() {
        let mut ob = book();
        let first = ob.create_order(Side::Ask, Decimal::MAX, AccountId(1)).unwrap();
        ob.place_limit(first, Decimal::from(100)).unwrap();
        let second = ob.create_order(Side::Ask, Decimal::MAX, AccountId(2)).unwrap();
        let second_id = second.id;
        assert_eq!(
            ob.place_limit(second, Decimal::from(101)),
            Err(EngineError::SizeOverflow {
                side: Side::Ask,
                size: Decimal::MAX
            })
        );
        assert!(!ob.contains(second_id));
        assert_eq!(ob.order_count(), 1);
        assert_eq!(ob.ask_volume(), Decimal::MAX);
        assert_eq!(ob.best_ask(), Some(Decimal::from(100)));
        ob.check_invariants().unwrap();

        // Each side bounds its own total.
        limit(&mut ob, Side::Bid, 1, 90, 3);
        assert_eq!(ob.bid_volume(), Decimal::ONE);
        ob.check_invariants().unwrap();
    }

    #[test]
    fn worked_order_cannot_rest() {
        let mut ob = book();
        limit(&mut ob, Side::Ask, 3, 100, 1);
        let (taker, matches) = market(&mut ob, Side::Bid, 5, 2);
        assert_eq!(matches.len(), 1);
        assert_eq!(
            ob.place_limit(taker.clone(), Decimal::from(99)),
            Err(EngineError::OrderNotFresh(taker.id))
        );
        assert!(ob.is_empty());

        let mut priced = ob.create_order(Side::Bid, Decimal::ONE, AccountId(2)).unwrap();
        priced.price = Some(Decimal::from(98));
        assert_eq!(
            ob.place_limit(priced.clone(), Decimal::from(99)),
            Err(EngineError::OrderNotFresh(priced.id))
        );
        assert!(ob.is_empty());
    }

    #[test]
    fn spread_requires_both_sides() {
        let mut ob = book();
        assert_eq!(ob.spread(), Err(EngineError::NoLiquidity(Side::Bid)));
        limit(&mut ob, Side::Bid, 1, 99, 1);
        assert_eq!(ob.spread(), Err(EngineError::NoLiquidity(Side::Ask)));
        limit(&mut ob, Side::Ask, 1, 101, 1);
        assert_eq!(ob.spread(), Ok(Decimal::from(2)));
    }

    #[test]
    fn snapshot_orders_levels_best_first() {
        let mut ob = book();
        limit(&mut ob, Side::Bid, 1, 90, 1);
        limit(&mut ob, Side::Bid, 2, 95, 2);
        limit(&mut ob, Side::Ask, 3, 101, 3);
        limit(&mut ob, Side::Ask, 4, 100, 4);
        limit(&mut ob, Side::Ask, 5, 100, 5);
        let snap = ob.snapshot();
        let bid_prices: Vec<Decimal> = snap.bids.iter().map(|l| l.price).collect();
        let ask_prices: Vec<Decimal> = snap.asks.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![Decimal::from(95), Decimal::from(90)]);
        assert_eq!(ask_prices, vec![Decimal::from(100), Decimal::from(101)]);
        assert_eq!(snap.asks[0].total_size, Decimal::from(9));
        assert_eq!(snap.asks[0].orders[0].account_id, AccountId(4));
        assert_eq!(snap.asks[0].orders[1].account_id, AccountId(5));
        assert!(snap.asks[0].orders[0].created_at < snap.asks[0].orders[1].created_at);
        assert_eq!(snap.ask_volume, Decimal::from(12));
        assert_eq!(snap.bid_volume, Decimal::from(3));
    }

    #[test]
    fn shared_sequencer_keeps_ids_unique_across_books() {
        let seq = Arc::new(Sequencer::new());
        let eth = OrderBook::with_sequencer(MarketId::new("ETH"), Arc::clone(&seq));
        let btc = OrderBook::with_sequencer(MarketId::new("BTC"), seq);
        let a = eth.create_order(Side::Bid, Decimal::ONE, AccountId(1)).unwrap();
        let b = btc.create_order(Side::Bid, Decimal::ONE, AccountId(1)).unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.created_at > a.created_at);
    }
}
