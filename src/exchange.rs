//! Multi-market exchange: the market registry and everything around the books.
//!
//! Each market owns one [`OrderBook`] behind its own `RwLock`, so markets never contend.
//! Placement and cancellation take the write lock; queries take the read lock. Matches are
//! recorded in the market's trade log under the book lock, then published to feed
//! subscribers and queued for settlement once the lock is released.

use crate::error::{EngineError, ExchangeError};
use crate::execution::{Match, Trade};
use crate::order_book::{BookSnapshot, OrderBook};
use crate::settlement::{Account, SettlementInstruction, SettlementQueue, SettlementSummary};
use crate::types::{AccountId, MarketId, Order, OrderId, OrderStatus, OrderType, Sequencer, Side};
use log::{info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

const TRADE_FEED_CAPACITY: usize = 1024;

/// A validated order submission.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceOrderRequest {
    pub account_id: AccountId,
    pub order_type: OrderType,
    pub side: Side,
    pub size: Decimal,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<Decimal>,
    pub market: MarketId,
}

/// Outcome of a placement.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PlaceOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled: Decimal,
    pub matches: Vec<Match>,
}

#[derive(Debug)]
struct MarketState {
    book: RwLock<OrderBook>,
    trades: Mutex<Vec<Trade>>,
}

/// The venue: a fixed set of markets built at startup plus the account registry.
#[derive(Debug)]
pub struct Exchange {
    markets: HashMap<MarketId, MarketState>,
    accounts: RwLock<HashMap<AccountId, Account>>,
    /// Limit orders placed per account; entries for orders no longer resting are pruned lazily.
    account_orders: Mutex<HashMap<AccountId, Vec<(MarketId, OrderId)>>>,
    trade_sequence: AtomicU64,
    settlement: SettlementQueue,
    trade_feed: broadcast::Sender<Trade>,
}

impl Exchange {
    /// Builds one empty book per market. All books share one id sequence.
    pub fn new<I>(markets: I, settlement: SettlementQueue) -> Self
    where
        I: IntoIterator<Item = MarketId>,
    {
        let sequencer = Arc::new(Sequencer::new());
        let markets = markets
            .into_iter()
            .map(|market| {
                let state = MarketState {
                    book: RwLock::new(OrderBook::with_sequencer(
                        market.clone(),
                        Arc::clone(&sequencer),
                    )),
                    trades: Mutex::new(Vec::new()),
                };
                (market, state)
            })
            .collect();
        let (trade_feed, _) = broadcast::channel(TRADE_FEED_CAPACITY);
        Self {
            markets,
            accounts: RwLock::new(HashMap::new()),
            account_orders: Mutex::new(HashMap::new()),
            trade_sequence: AtomicU64::new(1),
            settlement,
            trade_feed,
        }
    }

    /// Market ids in sorted order.
    pub fn markets(&self) -> Vec<MarketId> {
        let mut markets: Vec<MarketId> = self.markets.keys().cloned().collect();
        markets.sort();
        markets
    }

    pub fn register_account(&self, account: Account) {
        info!(
            "account registered account={} address={}",
            account.id, account.address
        );
        self.accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.id, account);
    }

    pub fn account(&self, id: AccountId) -> Result<Account, ExchangeError> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(ExchangeError::UnknownAccount(id))
    }

    /// Validates and places an order. Rejections happen before any book is touched.
    pub fn place_order(
        &self,
        request: PlaceOrderRequest,
    ) -> Result<PlaceOrderResponse, ExchangeError> {
        let market = self.market(&request.market)?;
        match request.order_type {
            OrderType::Limit => {
                let price = request.price.ok_or(EngineError::MissingPrice)?;
                let order_id = {
                    let mut book = write_book(market);
                    let order =
                        book.create_order(request.side, request.size, request.account_id)?;
                    let order_id = order.id;
                    book.place_limit(order, price)?;
                    order_id
                };
                self.account_orders
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(request.account_id)
                    .or_default()
                    .push((request.market.clone(), order_id));
                Ok(PlaceOrderResponse {
                    order_id,
                    status: OrderStatus::Resting,
                    filled: Decimal::ZERO,
                    matches: Vec::new(),
                })
            }
            OrderType::Market => {
                let (order, trades) = {
                    let mut book = write_book(market);
                    let mut order =
                        book.create_order(request.side, request.size, request.account_id)?;
                    let matches = book.place_market(&mut order)?;
                    let trades = self.record_trades(&request.market, market, matches);
                    (order, trades)
                };
                self.publish(&trades);
                let filled = order.filled_size();
                // Nothing filled means the whole order was discarded.
                let status = match order.status() {
                    OrderStatus::Resting => OrderStatus::Canceled,
                    status => status,
                };
                Ok(PlaceOrderResponse {
                    order_id: order.id,
                    status,
                    filled,
                    matches: trades.into_iter().map(|t| t.fill).collect(),
                })
            }
        }
    }

    /// Cancels a resting order in whichever market holds it.
    pub fn cancel_order(&self, order_id: OrderId) -> bool {
        for state in self.markets.values() {
            let mut book = write_book(state);
            if book.contains(order_id) {
                return book.cancel(order_id);
            }
        }
        info!("cancel ignored order_id={} reason=not resting", order_id);
        false
    }

    /// Live resting orders of a registered account, across all markets.
    pub fn orders_for_account(&self, account_id: AccountId) -> Result<Vec<Order>, ExchangeError> {
        self.account(account_id)?;
        let mut account_orders = self
            .account_orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = account_orders.get_mut(&account_id) else {
            return Ok(Vec::new());
        };
        let mut live = Vec::with_capacity(entries.len());
        entries.retain(|(market, order_id)| {
            let resting = self
                .markets
                .get(market)
                .and_then(|state| read_book(state).order(*order_id));
            match resting {
                Some(order) => {
                    live.push(order);
                    true
                }
                None => false,
            }
        });
        Ok(live)
    }

    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.markets
            .values()
            .find_map(|state| read_book(state).order(order_id))
    }

    pub fn book_snapshot(&self, market: &MarketId) -> Result<BookSnapshot, ExchangeError> {
        Ok(read_book(self.market(market)?).snapshot())
    }

    pub fn best_bid(&self, market: &MarketId) -> Result<Decimal, ExchangeError> {
        read_book(self.market(market)?)
            .best_bid()
            .ok_or(ExchangeError::Engine(EngineError::NoLiquidity(Side::Bid)))
    }

    pub fn best_ask(&self, market: &MarketId) -> Result<Decimal, ExchangeError> {
        read_book(self.market(market)?)
            .best_ask()
            .ok_or(ExchangeError::Engine(EngineError::NoLiquidity(Side::Ask)))
    }

    pub fn spread(&self, market: &MarketId) -> Result<Decimal, ExchangeError> {
        Ok(read_book(self.market(market)?).spread()?)
    }

    /// Executed trades of one market, oldest first.
    pub fn trades(&self, market: &MarketId) -> Result<Vec<Trade>, ExchangeError> {
        let state = self.market(market)?;
        Ok(state
            .trades
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    /// Receives every trade executed after the call, across all markets.
    pub fn subscribe(&self) -> broadcast::Receiver<Trade> {
        self.trade_feed.subscribe()
    }

    pub fn settlement_summary(&self) -> SettlementSummary {
        self.settlement.stats().summary()
    }

    /// Runs the consistency check of every book.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (market, state) in &self.markets {
            read_book(state)
                .check_invariants()
                .map_err(|e| format!("{}: {}", market, e))?;
        }
        Ok(())
    }

    fn market(&self, market: &MarketId) -> Result<&MarketState, ExchangeError> {
        self.markets
            .get(market)
            .ok_or_else(|| ExchangeError::UnknownMarket(market.clone()))
    }

    /// Stamps matches with trade sequences and appends them to the market's log.
    /// Called with the book's write lock held so the log stays in execution order.
    fn record_trades(
        &self,
        market: &MarketId,
        state: &MarketState,
        matches: Vec<Match>,
    ) -> Vec<Trade> {
        if matches.is_empty() {
            return Vec::new();
        }
        let trades: Vec<Trade> = matches
            .into_iter()
            .map(|fill| Trade {
                market: market.clone(),
                sequence: self.trade_sequence.fetch_add(1, Ordering::Relaxed),
                fill,
            })
            .collect();
        state
            .trades
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(trades.iter().cloned());
        trades
    }

    /// Sends trades to feed subscribers and queues one settlement per trade.
    fn publish(&self, trades: &[Trade]) {
        for trade in trades {
            info!(
                "trade market={} sequence={} price={} size={} maker={} taker={}",
                trade.market,
                trade.sequence,
                trade.fill.price,
                trade.fill.size,
                trade.fill.maker_order_id,
                trade.fill.taker_order_id
            );
            // No subscribers is not an error.
            let _ = self.trade_feed.send(trade.clone());
            self.dispatch_settlement(trade);
        }
    }

    fn dispatch_settlement(&self, trade: &Trade) {
        let seller = trade.fill.ask_account_id();
        let buyer = trade.fill.bid_account_id();
        let (from, to) = {
            let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
            (accounts.get(&seller).cloned(), accounts.get(&buyer).cloned())
        };
        match (from, to) {
            (Some(from), Some(to)) => {
                self.settlement.enqueue(SettlementInstruction {
                    trade: trade.clone(),
                    from,
                    to,
                    amount: trade.fill.size,
                });
            }
            (None, _) => {
                warn!("unresolved seller account={}", seller);
                self.settlement.report_unresolved(trade, seller);
            }
            (_, None) => {
                warn!("unresolved buyer account={}", buyer);
                self.settlement.report_unresolved(trade, buyer);
            }
        }
    }
}

fn read_book(state: &MarketState) -> RwLockReadGuard<'_, OrderBook> {
    state.book.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_book(state: &MarketState) -> RwLockWriteGuard<'_, OrderBook> {
    state.book.write().unwrap_or_else(PoisonError::into_inner)
}
