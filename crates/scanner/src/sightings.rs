use chrono::{DateTime, TimeZone, Utc};
use common::config::Scan;
use common::types::{ApiTopTrader, TrendingToken};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use std::str::FromStr;

/// (wallet_address, token_address)
pub type Pair = (String, String);
pub type KnownPairs = HashSet<Pair>;

/// A qualifying profitable (wallet, token) observation from one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub wallet_address: String,
    pub token_address: String,
    pub token_symbol: String,
    pub profit_usd: Decimal,
    pub profit_percent: f64,
    pub volume_usd: Decimal,
    pub buys: u32,
    pub sells: u32,
    pub last_trade_at: DateTime<Utc>,
}

impl Sighting {
    pub fn trades(&self) -> u32 {
        self.buys.saturating_add(self.sells)
    }

    pub fn pair(&self) -> Pair {
        (self.wallet_address.clone(), self.token_address.clone())
    }
}

/// Provider-side qualification thresholds (all strict except `min_trades`).
#[derive(Debug, Clone, PartialEq)]
pub struct QualifyRules {
    pub min_profit_usd: f64,
    pub min_profit_percent: f64,
    pub min_trades: u32,
}

impl From<&Scan> for QualifyRules {
    fn from(s: &Scan) -> Self {
        Self {
            min_profit_usd: s.min_profit_usd,
            min_profit_percent: s.min_profit_percent,
            min_trades: s.min_trades_to_save,
        }
    }
}

fn parse_usd(raw: Option<&str>) -> Decimal {
    raw.and_then(|s| Decimal::from_str(s.trim()).ok())
        .unwrap_or(Decimal::ZERO)
}

/// Turn a provider trader record into a Sighting, or None if it does not qualify.
/// Missing or malformed numbers count as zero, which never qualifies.
pub fn qualify(
    trader: &ApiTopTrader,
    token: &TrendingToken,
    rules: &QualifyRules,
    now: DateTime<Utc>,
) -> Option<Sighting> {
    let wallet_address = trader
        .wallet_address
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())?
        .to_string();

    let profit_usd = parse_usd(trader.realized_profit_usd.as_deref());
    let profit_percent = trader.realized_profit_percentage.unwrap_or(0.0);
    let buys = trader.buys.unwrap_or(0);
    let sells = trader.sells.unwrap_or(0);

    if profit_usd <= Decimal::ZERO || profit_usd.to_f64().unwrap_or(0.0) <= rules.min_profit_usd {
        return None;
    }
    if profit_percent <= rules.min_profit_percent {
        return None;
    }
    if buys.saturating_add(sells) < rules.min_trades {
        return None;
    }

    let last_trade_at = trader
        .last_transaction_at
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or(now);

    Some(Sighting {
        wallet_address,
        token_address: token.address.clone(),
        token_symbol: token.symbol.clone(),
        profit_usd,
        profit_percent,
        volume_usd: parse_usd(trader.volume_usd.as_deref()).max(Decimal::ZERO),
        buys,
        sells,
        last_trade_at,
    })
}

/// Drop sightings whose pair is already recorded, and repeats within the batch
/// (first occurrence wins). Returns the survivors and how many were dropped.
pub fn dedup_sightings(batch: Vec<Sighting>, known: &KnownPairs) -> (Vec<Sighting>, usize) {
    let mut seen: KnownPairs = HashSet::with_capacity(batch.len());
    let total = batch.len();
    let fresh: Vec<Sighting> = batch
        .into_iter()
        .filter(|s| {
            let pair = s.pair();
            !known.contains(&pair) && seen.insert(pair)
        })
        .collect();
    let dropped = total - fresh.len();
    (fresh, dropped)
}

/// Distinct wallets in a batch, sorted; the storage lookup key set.
pub fn wallets_in(batch: &[Sighting]) -> Vec<String> {
    let mut wallets: Vec<String> = batch.iter().map(|s| s.wallet_address.clone()).collect();
    wallets.sort();
    wallets.dedup();
    wallets
}

/// Immutable audit row for the first discovery of a (wallet, token) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub wallet_address: String,
    pub token_address: String,
    pub token_symbol: String,
    pub pnl_percent: i64,
    pub pnl_usd: Decimal,
    pub trades: u32,
    pub volume_usd: Decimal,
    pub discovered_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_sighting(s: &Sighting, discovered_at: DateTime<Utc>) -> Self {
        Self {
            wallet_address: s.wallet_address.clone(),
            token_address: s.token_address.clone(),
            token_symbol: s.token_symbol.clone(),
            pnl_percent: round_percent(s.profit_percent),
            pnl_usd: round_usd(s.profit_usd),
            trades: s.trades(),
            volume_usd: round_usd(s.volume_usd),
            discovered_at,
        }
    }
}

/// USD amounts are kept to cents, half away from zero.
pub fn round_usd(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Percentages are kept as whole points, half away from zero.
pub fn round_percent(x: f64) -> i64 {
    if x.is_finite() {
        x.round() as i64
    } else {
        0
    }
}
