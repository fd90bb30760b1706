//! Price-time priority matching of an incoming market order.
//!
//! [`match_market`] walks the opposite side best level first and, within a level, earliest
//! arrival first. Each step fills one resting order and leaves the side and the order index
//! consistent before the next step starts.

use crate::book_side::BookSide;
use crate::execution::Match;
use crate::order_book::OrderHandle;
use crate::types::{Order, OrderId};
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Matches `taker` against `opposite` until the taker is filled or the side is exhausted.
///
/// `taker.remaining_size` is decremented in place; whatever is left afterwards is the
/// unfilled remainder, which the caller discards. Returns matches in execution order.
pub fn match_market(
    opposite: &mut BookSide,
    index: &mut HashMap<OrderId, OrderHandle>,
    taker: &mut Order,
) -> Vec<Match> {
    debug_assert_ne!(opposite.side(), taker.side);
    let mut matches = Vec::new();

    while taker.remaining_size > Decimal::ZERO {
        let Some((price, fill)) = opposite.fill_best(taker.remaining_size) else {
            break;
        };
        taker.remaining_size -= fill.size;
        if fill.maker_filled {
            index.remove(&fill.maker.id);
        }
        debug!(
            "fill price={} size={} maker={} taker={} maker_remaining={}",
            price, fill.size, fill.maker.id, taker.id, fill.maker.remaining_size
        );
        matches.push(Match {
            price,
            size: fill.size,
            maker_order_id: fill.maker.id,
            maker_account_id: fill.maker.account_id,
            taker_order_id: taker.id,
            taker_account_id: taker.account_id,
            taker_side: taker.side,
        });
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, Side};

    fn resting(id: u64, account: u64, side: Side, size: i64, price: i64) -> Order {
        Order {
            id: OrderId(id),
            account_id: AccountId(account),
            side,
            size: Decimal::from(size),
            remaining_size: Decimal::from(size),
            created_at: id,
            price: Some(Decimal::from(price)),
        }
    }

    fn taker(id: u64, side: Side, size: i64) -> Order {
        Order {
            id: OrderId(id),
            account_id: AccountId(99),
            side,
            size: Decimal::from(size),
            remaining_size: Decimal::from(size),
            created_at: id,
            price: None,
        }
    }

    fn seed(side: &mut BookSide, index: &mut HashMap<OrderId, OrderHandle>, orders: Vec<Order>) {
        for (slot, o) in orders.into_iter().enumerate() {
            let price = o.price.unwrap();
            index.insert(
                o.id,
                OrderHandle {
                    side: o.side,
                    price,
                    slot: slot as u64,
                },
            );
            side.insert(price, slot as u64, o);
        }
    }

    #[test]
    fn empty_side_produces_no_matches() {
        let mut asks = BookSide::new(Side::Ask);
        let mut index = HashMap::new();
        let mut t = taker(1, Side::Bid, 5);
        let matches = match_market(&mut asks, &mut index, &mut t);
        assert!(matches.is_empty());
        assert_eq!(t.remaining_size, Decimal::from(5));
    }

    #[test]
    fn fills_price_then_time() {
        let mut asks = BookSide::new(Side::Ask);
        let mut index = HashMap::new();
        seed(
            &mut asks,
            &mut index,
            vec![
                resting(1, 1, Side::Ask, 4, 101),
                resting(2, 2, Side::Ask, 3, 100),
                resting(3, 3, Side::Ask, 3, 100),
            ],
        );
        let mut t = taker(10, Side::Bid, 8);
        let matches = match_market(&mut asks, &mut index, &mut t);
        let seen: Vec<(u64, Decimal)> = matches
            .iter()
            .map(|m| (m.maker_order_id.0, m.size))
            .collect();
        assert_eq!(
            seen,
            vec![
                (2, Decimal::from(3)),
                (3, Decimal::from(3)),
                (1, Decimal::from(2))
            ]
        );
        assert_eq!(matches[2].price, Decimal::from(101));
        assert_eq!(t.remaining_size, Decimal::ZERO);
        assert!(!index.contains_key(&OrderId(2)));
        assert!(!index.contains_key(&OrderId(3)));
        assert!(index.contains_key(&OrderId(1)), "partially filled maker stays indexed");
        assert_eq!(asks.volume(), Decimal::from(2));
    }

    #[test]
    fn remainder_left_on_taker_when_side_exhausted() {
        let mut bids = BookSide::new(Side::Bid);
        let mut index = HashMap::new();
        seed(&mut bids, &mut index, vec![resting(1, 1, Side::Bid, 3, 90)]);
        let mut t = taker(2, Side::Ask, 10);
        let matches = match_market(&mut bids, &mut index, &mut t);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].taker_side, Side::Ask);
        assert_eq!(t.remaining_size, Decimal::from(7));
        assert!(bids.is_empty());
        assert!(index.is_empty());
    }
}
