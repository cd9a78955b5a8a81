use chrono::{DateTime, Utc};
use common::config::Tags;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::sightings::{round_percent, round_usd, Sighting};
use crate::tags::{derive_tags, TagInput, WalletTag};

/// One run's new sightings for a single wallet, folded together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletPartial {
    pub pnl_usd: Decimal,
    pub pnl_percent: f64,
    pub trades: u32,
    pub token_count: u32,
    pub volume_usd: Decimal,
}

impl WalletPartial {
    fn add(&mut self, s: &Sighting) {
        self.pnl_usd += s.profit_usd;
        self.pnl_percent += s.profit_percent;
        self.trades = self.trades.saturating_add(s.trades());
        self.token_count = self.token_count.saturating_add(1);
        self.volume_usd += s.volume_usd;
    }

    #[cfg(test)]
    pub fn combined(&self, other: &WalletPartial) -> WalletPartial {
        WalletPartial {
            pnl_usd: self.pnl_usd + other.pnl_usd,
            pnl_percent: self.pnl_percent + other.pnl_percent,
            trades: self.trades.saturating_add(other.trades),
            token_count: self.token_count.saturating_add(other.token_count),
            volume_usd: self.volume_usd + other.volume_usd,
        }
    }
}

/// Fold deduplicated sightings into per-wallet partials. Every sighting counts
/// as one token contribution; repeats are not collapsed here.
pub fn aggregate_by_wallet(sightings: &[Sighting]) -> BTreeMap<String, WalletPartial> {
    let mut out: BTreeMap<String, WalletPartial> = BTreeMap::new();
    for s in sightings {
        out.entry(s.wallet_address.clone()).or_default().add(s);
    }
    out
}

/// Persisted running totals for one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAggregate {
    pub wallet_address: String,
    pub total_pnl: i64,
    pub total_pnl_usd: Decimal,
    pub avg_pnl_per_token: i64,
    pub appearances: u32,
    pub total_trades: u32,
    pub winning_tokens: u32,
    pub avg_return: i64,
    pub win_rate: u32,
    pub tags: Vec<WalletTag>,
    pub last_trade_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn win_rate(winning_tokens: u32) -> u32 {
    winning_tokens.saturating_mul(5).saturating_add(50).min(95)
}

fn ratio(total: f64, count: u32) -> i64 {
    if count == 0 {
        0
    } else {
        round_percent(total / f64::from(count))
    }
}

/// Merge a wallet's new partial into its existing aggregate (or start one).
///
/// `winning_tokens` moves in lockstep with `appearances`; both averages are
/// kept even though they agree today.
pub fn merge_aggregate(
    wallet_address: &str,
    partial: &WalletPartial,
    existing: Option<&WalletAggregate>,
    now: DateTime<Utc>,
    thresholds: &Tags,
) -> WalletAggregate {
    let (base_pnl, base_usd, base_appearances, base_trades, base_winning, created_at) =
        match existing {
            Some(e) => (
                e.total_pnl as f64,
                e.total_pnl_usd,
                e.appearances,
                e.total_trades,
                e.winning_tokens,
                e.created_at,
            ),
            None => (0.0, Decimal::ZERO, 0, 0, 0, now),
        };

    let pnl_sum = base_pnl + partial.pnl_percent;
    let total_pnl_usd = round_usd(base_usd + partial.pnl_usd);
    let appearances = base_appearances.saturating_add(partial.token_count);
    let total_trades = base_trades.saturating_add(partial.trades);
    let winning_tokens = base_winning.saturating_add(partial.token_count);

    let tags = derive_tags(
        &TagInput {
            appearances,
            total_pnl_usd,
            total_pnl_percent: pnl_sum,
            total_trades,
        },
        thresholds,
    );

    WalletAggregate {
        wallet_address: wallet_address.to_string(),
        total_pnl: round_percent(pnl_sum),
        total_pnl_usd,
        avg_pnl_per_token: ratio(pnl_sum, appearances),
        appearances,
        total_trades,
        winning_tokens,
        avg_return: ratio(pnl_sum, winning_tokens),
        win_rate: win_rate(winning_tokens),
        tags,
        last_trade_at: now,
        created_at,
        updated_at: now,
    }
}
