//! One side of the book: price levels sorted best-first.
//!
//! Asks are best at the lowest price, bids at the highest. Levels live in a [`BTreeMap`]
//! keyed by price; the side also keeps a running total of resting size.

use crate::price_level::{LevelFill, PriceLevel};
use crate::types::{Order, Side};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Price-indexed levels for bids or asks.
#[derive(Clone, Debug)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Decimal, PriceLevel>,
    volume: Decimal,
    order_count: usize,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            volume: Decimal::ZERO,
            order_count: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Sum of remaining size across all levels.
    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn order_count(&self) -> usize {
        self.order_count
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn best_price(&self) -> Option<Decimal> {
        match self.side {
            Side::Ask => self.levels.keys().next().copied(),
            Side::Bid => self.levels.keys().next_back().copied(),
        }
    }

    fn best_level_mut(&mut self) -> Option<&mut PriceLevel> {
        match self.side {
            Side::Ask => self.levels.values_mut().next(),
            Side::Bid => self.levels.values_mut().next_back(),
        }
    }

    pub fn level(&self, price: Decimal) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    /// Levels best-first.
    pub fn levels(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Ask => Box::new(self.levels.values()),
            Side::Bid => Box::new(self.levels.values().rev()),
        }
    }

    /// Whether `size` more can rest without overflowing the side total.
    ///
    /// Every level total is bounded by the side total, so this also covers the level.
    pub fn has_room_for(&self, size: Decimal) -> bool {
        self.volume.checked_add(size).is_some()
    }

    /// Rests `order` at `price` behind everything already queued there.
    ///
    /// Callers check [`BookSide::has_room_for`] first.
    pub fn insert(&mut self, price: Decimal, slot: u64, order: Order) {
        self.volume += order.remaining_size;
        self.order_count += 1;
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(slot, order);
    }

    /// Removes the order at (`price`, `slot`), dropping the level if it empties.
    pub fn remove(&mut self, price: Decimal, slot: u64) -> Option<Order> {
        let level = self.levels.get_mut(&price)?;
        let order = level.remove(slot)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        self.volume -= order.remaining_size;
        self.order_count -= 1;
        Some(order)
    }

    /// One matching step: fills up to `max` from the front order of the best level.
    ///
    /// Returns the fill with the level's price, or `None` if the side is empty. Volume,
    /// level totals and empty-level removal are all settled before returning.
    pub fn fill_best(&mut self, max: Decimal) -> Option<(Decimal, LevelFill)> {
        let level = self.best_level_mut()?;
        let price = level.price();
        let fill = level.fill_front(max)?;
        let level_empty = level.is_empty();
        if level_empty {
            self.levels.remove(&price);
        }
        self.volume -= fill.size;
        if fill.maker_filled {
            self.order_count -= 1;
        }
        Some((price, fill))
    }
}
