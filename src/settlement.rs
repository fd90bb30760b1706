//! Settlement of matches: value moves from the seller's account to the buyer's.
//!
//! The exchange never settles inline. It pushes one [`SettlementInstruction`] per match onto a
//! [`SettlementQueue`] after the book lock is released, and [`run_settlement_worker`] drains the
//! queue on a background task. A failed transfer is logged and counted; the match stands.

use crate::error::SettlementError;
use crate::execution::Trade;
use crate::types::AccountId;
use async_trait::async_trait;
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A registered trading account and the address its funds settle to.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub address: String,
}

impl Account {
    pub fn new(id: AccountId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

/// Moves `amount` of the traded asset between two accounts.
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn transfer(
        &self,
        from: &Account,
        to: &Account,
        amount: Decimal,
    ) -> Result<(), SettlementError>;
}

/// Balances per address, held in memory. Rejects transfers that would overdraw.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<String, Decimal>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances<I, S>(balances: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let balances = balances
            .into_iter()
            .map(|(address, amount)| (address.into(), amount))
            .collect();
        Self {
            balances: Mutex::new(balances),
        }
    }

    pub fn deposit(&self, address: &str, amount: Decimal) {
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        *balances.entry(address.to_string()).or_insert(Decimal::ZERO) += amount;
    }

    /// Balance at `address`; zero when the address has never been funded.
    pub fn balance_of(&self, address: &str) -> Decimal {
        let balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        balances.get(address).copied().unwrap_or(Decimal::ZERO)
    }

    /// Sum of all balances. Transfers never change it.
    pub fn total(&self) -> Decimal {
        let balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        balances.values().copied().sum()
    }
}

#[async_trait]
impl Settlement for InMemoryLedger {
    async fn transfer(
        &self,
        from: &Account,
        to: &Account,
        amount: Decimal,
    ) -> Result<(), SettlementError> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::Rejected(format!(
                "non-positive amount {}",
                amount
            )));
        }
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        let balance = balances.get(&from.address).copied().unwrap_or(Decimal::ZERO);
        if balance < amount {
            return Err(SettlementError::InsufficientFunds {
                address: from.address.clone(),
                balance,
                needed: amount,
            });
        }
        let to_balance = balances.get(&to.address).copied().unwrap_or(Decimal::ZERO);
        if to.address != from.address && to_balance.checked_add(amount).is_none() {
            return Err(SettlementError::Rejected(format!(
                "balance overflow at {}",
                to.address
            )));
        }
        balances.insert(from.address.clone(), balance - amount);
        *balances.entry(to.address.clone()).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }
}

/// One transfer owed for one match: `from` is the seller (ask), `to` the buyer (bid).
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementInstruction {
    pub trade: Trade,
    pub from: Account,
    pub to: Account,
    pub amount: Decimal,
}

/// Counters for settlement outcomes, shared between the queue and the worker.
#[derive(Debug, Default)]
pub struct SettlementStats {
    enqueued: AtomicU64,
    settled: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of [`SettlementStats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SettlementSummary {
    pub settled: u64,
    pub failed: u64,
    /// Enqueued but not yet settled or failed.
    pub pending: u64,
}

impl SettlementStats {
    pub fn record_settled(&self) {
        self.settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> SettlementSummary {
        let settled = self.settled.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let enqueued = self.enqueued.load(Ordering::Relaxed);
        SettlementSummary {
            settled,
            failed,
            pending: enqueued.saturating_sub(settled + failed),
        }
    }
}

/// Sending half of the settlement channel.
#[derive(Clone, Debug)]
pub struct SettlementQueue {
    tx: UnboundedSender<SettlementInstruction>,
    stats: Arc<SettlementStats>,
}

impl SettlementQueue {
    /// Creates the queue and the receiver to hand to [`run_settlement_worker`].
    pub fn channel() -> (Self, UnboundedReceiver<SettlementInstruction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx,
            stats: Arc::new(SettlementStats::default()),
        };
        (queue, rx)
    }

    /// Queues an instruction. Never blocks. Returns `false` if the worker has shut down.
    pub fn enqueue(&self, instruction: SettlementInstruction) -> bool {
        self.stats.record_enqueued();
        let sequence = instruction.trade.sequence;
        if self.tx.send(instruction).is_err() {
            error!(
                "settlement worker gone, trade left unsettled sequence={}",
                sequence
            );
            self.stats.record_failed();
            return false;
        }
        true
    }

    /// Records a trade that cannot be settled because `account` has no registered address.
    pub fn report_unresolved(&self, trade: &Trade, account: AccountId) {
        self.stats.record_enqueued();
        self.stats.record_failed();
        error!(
            "settlement failed market={} sequence={} error=unknown account {}",
            trade.market, trade.sequence, account
        );
    }

    pub fn stats(&self) -> Arc<SettlementStats> {
        Arc::clone(&self.stats)
    }
}

/// Per-transfer timeout and retry budget for the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlementConfig {
    pub timeout: Duration,
    /// Total attempts per instruction, including the first. Treated as at least 1.
    pub max_attempts: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_attempts: 3,
        }
    }
}

/// Drains `rx` until every sender is dropped, settling one instruction at a time.
pub async fn run_settlement_worker(
    mut rx: UnboundedReceiver<SettlementInstruction>,
    settlement: Arc<dyn Settlement>,
    config: SettlementConfig,
    stats: Arc<SettlementStats>,
) {
    info!(
        "settlement worker started timeout_ms={} max_attempts={}",
        config.timeout.as_millis(),
        config.max_attempts
    );
    while let Some(instruction) = rx.recv().await {
        match settle_one(settlement.as_ref(), &instruction, config).await {
            Ok(attempts) => {
                stats.record_settled();
                info!(
                    "settled market={} sequence={} from={} to={} amount={} attempts={}",
                    instruction.trade.market,
                    instruction.trade.sequence,
                    instruction.from.id,
                    instruction.to.id,
                    instruction.amount,
                    attempts
                );
            }
            Err(e) => {
                stats.record_failed();
                error!(
                    "settlement failed market={} sequence={} from={} to={} amount={} error={}",
                    instruction.trade.market,
                    instruction.trade.sequence,
                    instruction.from.id,
                    instruction.to.id,
                    instruction.amount,
                    e
                );
            }
        }
    }
    info!("settlement worker stopped");
}

async fn settle_one(
    settlement: &dyn Settlement,
    instruction: &SettlementInstruction,
    config: SettlementConfig,
) -> Result<u32, SettlementError> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let transfer = settlement.transfer(&instruction.from, &instruction.to, instruction.amount);
        let outcome = match tokio::time::timeout(config.timeout, transfer).await {
            Ok(result) => result,
            Err(_) => Err(SettlementError::Timeout(config.timeout.as_millis() as u64)),
        };
        match outcome {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    "settlement retry sequence={} attempt={} error={}",
                    instruction.trade.sequence, attempt, e
                );
            }
            Err(e) => return Err(e),
        }
    }
}
