//! Process configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | `3000` |
//! | `MARKETS` | `ETH` (comma list) |
//! | `ACCOUNTS` | the three demo accounts (comma list of `id:address`) |
//! | `INITIAL_BALANCE` | `1000`, credited to every account's address at startup |
//! | `SETTLEMENT_TIMEOUT_MS` | `5000` |
//! | `SETTLEMENT_MAX_ATTEMPTS` | `3` |
//!
//! A malformed value is logged and replaced by its default.

use crate::settlement::{Account, SettlementConfig};
use crate::types::{AccountId, MarketId};
use log::warn;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MARKETS: &str = "ETH";
const DEFAULT_ACCOUNTS: &str = "8:0xACa94ef8bD5ffEE41947b4585a84BdA5a3d3DA6E,\
7:0x28a8746e75304c0780E011BEd21C72cD78cd535E,\
666:0x3E5e9111Ae8eB78Fe1CC3bb8915d5D461F3Ef9A9";
const DEFAULT_INITIAL_BALANCE: i64 = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub port: u16,
    pub markets: Vec<MarketId>,
    pub accounts: Vec<Account>,
    pub initial_balance: Decimal,
    pub settlement: SettlementConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `None` means unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SettlementConfig::default();
        let timeout_ms = parse_or(
            &lookup,
            "SETTLEMENT_TIMEOUT_MS",
            defaults.timeout.as_millis() as u64,
        );
        let max_attempts = parse_or(&lookup, "SETTLEMENT_MAX_ATTEMPTS", defaults.max_attempts);
        Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            markets: markets_or_default(lookup("MARKETS")),
            accounts: accounts_or_default(lookup("ACCOUNTS")),
            initial_balance: parse_or(
                &lookup,
                "INITIAL_BALANCE",
                Decimal::from(DEFAULT_INITIAL_BALANCE),
            ),
            settlement: SettlementConfig {
                timeout: Duration::from_millis(timeout_ms),
                max_attempts,
            },
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("invalid {}={:?}, using default {}", key, raw, default);
            default
        }
    }
}

fn parse_markets(raw: &str) -> Vec<MarketId> {
    let mut markets: Vec<MarketId> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| MarketId::new(s))
        .collect();
    markets.sort();
    markets.dedup();
    markets
}

fn markets_or_default(raw: Option<String>) -> Vec<MarketId> {
    if let Some(raw) = raw {
        let markets = parse_markets(&raw);
        if !markets.is_empty() {
            return markets;
        }
        warn!("invalid MARKETS={:?}, using default {}", raw, DEFAULT_MARKETS);
    }
    parse_markets(DEFAULT_MARKETS)
}

fn parse_accounts(raw: &str) -> Option<Vec<Account>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (id, address) = entry.split_once(':')?;
            let id = id.trim().parse().ok()?;
            let address = address.trim();
            if address.is_empty() {
                return None;
            }
            Some(Account::new(AccountId(id), address))
        })
        .collect()
}

fn accounts_or_default(raw: Option<String>) -> Vec<Account> {
    if let Some(raw) = raw {
        match parse_accounts(&raw) {
            Some(accounts) => return accounts,
            None => warn!("invalid ACCOUNTS={:?}, using demo accounts", raw),
        }
    }
    parse_accounts(DEFAULT_ACCOUNTS).unwrap_or_default()
}
