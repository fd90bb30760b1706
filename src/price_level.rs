//! One price level: a FIFO queue of resting orders at a single price.
//!
//! Orders are keyed by the book's arrival slot, so iteration order is arrival order and a
//! cancel can find its order in O(log n) without scanning the queue.

use crate::types::Order;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Result of filling the front order of a level.
#[derive(Clone, Debug)]
pub struct LevelFill {
    /// Maker state after the fill.
    pub maker: Order,
    pub size: Decimal,
    /// True if the maker was fully filled and removed from the level.
    pub maker_filled: bool,
}

/// Orders at one price in time priority, with their cached total size.
#[derive(Clone, Debug)]
pub struct PriceLevel {
    price: Decimal,
    orders: BTreeMap<u64, Order>,
    total_size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: BTreeMap::new(),
            total_size: Decimal::ZERO,
        }
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn total_size(&self) -> Decimal {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Appends an order at the back of the queue. `slot` must exceed every slot already queued.
    pub fn push_back(&mut self, slot: u64, order: Order) {
        debug_assert!(
            self.orders.keys().next_back().map_or(true, |&last| last < slot),
            "arrival slot {} is not after the level tail",
            slot
        );
        self.total_size += order.remaining_size;
        self.orders.insert(slot, order);
    }

    /// Removes the order in `slot`, returning it with its remaining size.
    pub fn remove(&mut self, slot: u64) -> Option<Order> {
        let order = self.orders.remove(&slot)?;
        self.total_size -= order.remaining_size;
        Some(order)
    }

    pub fn get(&self, slot: u64) -> Option<&Order> {
        self.orders.get(&slot)
    }

    /// Front order (earliest arrival), if any.
    pub fn front(&self) -> Option<&Order> {
        self.orders.values().next()
    }

    /// Fills up to `max` from the front order. Removes the order once nothing remains.
    pub fn fill_front(&mut self, max: Decimal) -> Option<LevelFill> {
        let mut entry = self.orders.first_entry()?;
        let order = entry.get_mut();
        let size = max.min(order.remaining_size);
        order.remaining_size -= size;
        self.total_size -= size;
        let maker_filled = order.is_filled();
        let maker = if maker_filled {
            entry.remove()
        } else {
            order.clone()
        };
        Some(LevelFill {
            maker,
            size,
            maker_filled,
        })
    }

    /// Orders in time priority.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Arrival slots paired with their orders, in time priority.
    pub fn slots(&self) -> impl Iterator<Item = (u64, &Order)> {
        self.orders.iter().map(|(slot, order)| (*slot, order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, OrderId, Side};

    fn order(id: u64, size: i64) -> Order {
        Order {
            id: OrderId(id),
            account_id: AccountId(1),
            side: Side::Ask,
            size: Decimal::from(size),
            remaining_size: Decimal::from(size),
            created_at: id,
            price: Some(Decimal::from(100)),
        }
    }

    #[test]
    fn push_keeps_fifo_and_total() {
        let mut level = PriceLevel::new(Decimal::from(100));
        level.push_back(1, order(1, 2));
        level.push_back(2, order(2, 3));
        level.push_back(3, order(3, 5));
        assert_eq!(level.len(), 3);
        assert_eq!(level.total_size(), Decimal::from(10));
        let ids: Vec<u64> = level.iter().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn remove_middle_order_updates_total() {
        let mut level = PriceLevel::new(Decimal::from(100));
        level.push_back(1, order(1, 2));
        level.push_back(2, order(2, 3));
        let removed = level.remove(1).unwrap();
        assert_eq!(removed.id, OrderId(1));
        assert_eq!(level.total_size(), Decimal::from(3));
        assert!(level.remove(1).is_none());
    }

    #[test]
    fn partial_fill_keeps_front() {
        let mut level = PriceLevel::new(Decimal::from(100));
        level.push_back(1, order(1, 5));
        let fill = level.fill_front(Decimal::from(2)).unwrap();
        assert_eq!(fill.size, Decimal::from(2));
        assert!(!fill.maker_filled);
        assert_eq!(fill.maker.remaining_size, Decimal::from(3));
        assert_eq!(level.total_size(), Decimal::from(3));
        assert_eq!(level.front().unwrap().remaining_size, Decimal::from(3));
    }

    #[test]
    fn full_fill_pops_front() {
        let mut level = PriceLevel::new(Decimal::from(100));
        level.push_back(1, order(1, 5));
        level.push_back(2, order(2, 1));
        let fill = level.fill_front(Decimal::from(9)).unwrap();
        assert_eq!(fill.size, Decimal::from(5));
        assert!(fill.maker_filled);
        assert_eq!(fill.maker.remaining_size, Decimal::ZERO);
        assert_eq!(level.front().unwrap().id, OrderId(2));
        assert_eq!(level.total_size(), Decimal::ONE);
    }

    #[test]
    fn fill_on_empty_level_is_none() {
        let mut level = PriceLevel::new(Decimal::from(100));
        assert!(level.fill_front(Decimal::ONE).is_none());
        assert!(level.is_empty());
    }
}
