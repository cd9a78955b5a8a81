use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use common::db::AsyncDb;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::aggregation::WalletAggregate;
use crate::sightings::{HistoryEntry, KnownPairs};
use crate::tags::WalletTag;

/// SQLite caps bound parameters per statement; stay well under it.
const LOOKUP_CHUNK: usize = 500;

/// One wallet write. `expected_updated_at` is the `updated_at` read before
/// merging; `None` means the wallet was not stored yet.
#[derive(Debug, Clone)]
pub struct WalletWrite {
    pub next: WalletAggregate,
    pub expected_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("wallet {0} was modified by another scan; batch rolled back")]
    Conflict(String),
}

pub trait ScanStore {
    fn known_pairs(
        &self,
        wallets: &[String],
    ) -> impl std::future::Future<Output = Result<KnownPairs>> + Send;

    fn load_wallets(
        &self,
        wallets: &[String],
    ) -> impl std::future::Future<Output = Result<HashMap<String, WalletAggregate>>> + Send;

    /// Writes a scan's wallet aggregates and its history rows in one transaction.
    ///
    /// The wallet writes are all-or-nothing and fail with [`StoreError::Conflict`]
    /// when any wallet moved underneath us; no history is written then. History
    /// rows sit in a savepoint: if they fail, only they are rolled back and the
    /// error is handed back in [`CommitOutcome::history`].
    fn commit_scan(
        &self,
        writes: Vec<WalletWrite>,
        history: Vec<HistoryEntry>,
    ) -> impl std::future::Future<Output = Result<CommitOutcome>> + Send;
}

#[derive(Debug)]
pub struct CommitOutcome {
    pub wallets_updated: usize,
    /// Rows actually inserted (known pairs are ignored), or why the history write failed.
    pub history: std::result::Result<usize, String>,
}

pub fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp {s:?}"))?
        .with_timezone(&Utc))
}

pub fn tags_to_json(tags: &[WalletTag]) -> String {
    let labels: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
    serde_json::Value::from(labels).to_string()
}

pub fn tags_from_json(s: &str) -> Vec<WalletTag> {
    serde_json::from_str::<Vec<String>>(s)
        .unwrap_or_default()
        .iter()
        .filter_map(|l| WalletTag::from_label(l))
        .collect()
}

pub const WALLET_COLUMNS: &str = "wallet_address, total_pnl, total_pnl_usd, avg_pnl_per_token, appearances, \
     total_trades, winning_tokens, avg_return, win_rate, tags, last_trade_at, created_at, updated_at";

/// Raw `wallets` row, converted outside the rusqlite row closure.
pub struct WalletRow {
    wallet_address: String,
    total_pnl: i64,
    total_pnl_usd: String,
    avg_pnl_per_token: i64,
    appearances: u32,
    total_trades: u32,
    winning_tokens: u32,
    avg_return: i64,
    win_rate: u32,
    tags: String,
    last_trade_at: String,
    created_at: String,
    updated_at: String,
}

impl WalletRow {
    /// Expects the columns in [`WALLET_COLUMNS`] order.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            wallet_address: row.get(0)?,
            total_pnl: row.get(1)?,
            total_pnl_usd: row.get(2)?,
            avg_pnl_per_token: row.get(3)?,
            appearances: row.get(4)?,
            total_trades: row.get(5)?,
            winning_tokens: row.get(6)?,
            avg_return: row.get(7)?,
            win_rate: row.get(8)?,
            tags: row.get(9)?,
            last_trade_at: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    pub fn into_aggregate(self) -> Result<WalletAggregate> {
        Ok(WalletAggregate {
            total_pnl_usd: Decimal::from_str(&self.total_pnl_usd)
                .with_context(|| format!("bad total_pnl_usd for {}", self.wallet_address))?,
            tags: tags_from_json(&self.tags),
            last_trade_at: parse_ts(&self.last_trade_at)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            wallet_address: self.wallet_address,
            total_pnl: self.total_pnl,
            avg_pnl_per_token: self.avg_pnl_per_token,
            appearances: self.appearances,
            total_trades: self.total_trades,
            winning_tokens: self.winning_tokens,
            avg_return: self.avg_return,
            win_rate: self.win_rate,
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl ScanStore for AsyncDb {
    async fn known_pairs(&self, wallets: &[String]) -> Result<KnownPairs> {
        let wallets = wallets.to_vec();
        self.call_named("scan_store.known_pairs", move |conn| {
            let mut pairs = KnownPairs::new();
            for chunk in wallets.chunks(LOOKUP_CHUNK) {
                let sql = format!(
                    "SELECT wallet_address, token_address FROM wallet_history
                     WHERE wallet_address IN ({})",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for pair in rows {
                    pairs.insert(pair?);
                }
            }
            Ok(pairs)
        })
        .await
    }

    async fn load_wallets(&self, wallets: &[String]) -> Result<HashMap<String, WalletAggregate>> {
        let wallets = wallets.to_vec();
        let rows = self
            .call_named("scan_store.load_wallets", move |conn| {
                let mut out = Vec::new();
                for chunk in wallets.chunks(LOOKUP_CHUNK) {
                    let sql = format!(
                        "SELECT {WALLET_COLUMNS} FROM wallets WHERE wallet_address IN ({})",
                        placeholders(chunk.len())
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows =
                        stmt.query_map(rusqlite::params_from_iter(chunk.iter()), WalletRow::from_row)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                Ok(out)
            })
            .await?;

        rows.into_iter()
            .map(|r| r.into_aggregate().map(|a| (a.wallet_address.clone(), a)))
            .collect()
    }

    async fn commit_scan(
        &self,
        writes: Vec<WalletWrite>,
        history: Vec<HistoryEntry>,
    ) -> Result<CommitOutcome> {
        self.call_named("scan_store.commit_scan", move |conn| {
            let mut tx = conn.transaction()?;
            let wallets_updated = write_wallets(&tx, &writes)?;
            let history_res = {
                let sp = tx.savepoint()?;
                match write_history(&sp, &history) {
                    Ok(n) => sp.commit().map(|()| n).map_err(|e| e.to_string()),
                    // Dropping the savepoint rolls the history rows back.
                    Err(e) => Err(format!("{e:#}")),
                }
            };
            tx.commit()?;
            Ok(CommitOutcome {
                wallets_updated,
                history: history_res,
            })
        })
        .await
    }
}

fn write_history(conn: &rusqlite::Connection, entries: &[HistoryEntry]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO wallet_history
         (wallet_address, token_address, token_symbol, pnl_percent, pnl_usd, trades, volume_usd, discovered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut inserted = 0;
    for e in entries {
        inserted += stmt.execute(rusqlite::params![
            e.wallet_address,
            e.token_address,
            e.token_symbol,
            e.pnl_percent,
            e.pnl_usd.to_string(),
            e.trades,
            e.volume_usd.to_string(),
            fmt_ts(e.discovered_at),
        ])?;
    }
    Ok(inserted)
}

fn write_wallets(conn: &rusqlite::Connection, writes: &[WalletWrite]) -> Result<usize> {
    for w in writes {
        let a = &w.next;
        let tags = tags_to_json(&a.tags);
        match w.expected_updated_at {
            None => {
                conn.execute(
                    &format!(
                        "INSERT INTO wallets ({WALLET_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                    ),
                    rusqlite::params![
                        a.wallet_address,
                        a.total_pnl,
                        a.total_pnl_usd.to_string(),
                        a.avg_pnl_per_token,
                        a.appearances,
                        a.total_trades,
                        a.winning_tokens,
                        a.avg_return,
                        a.win_rate,
                        tags,
                        fmt_ts(a.last_trade_at),
                        fmt_ts(a.created_at),
                        fmt_ts(a.updated_at),
                    ],
                )
                .with_context(|| format!("insert wallet {}", a.wallet_address))?;
            }
            Some(expected) => {
                let changed = conn.execute(
                    "UPDATE wallets SET
                        total_pnl = ?2,
                        total_pnl_usd = ?3,
                        avg_pnl_per_token = ?4,
                        appearances = ?5,
                        total_trades = ?6,
                        winning_tokens = ?7,
                        avg_return = ?8,
                        win_rate = ?9,
                        tags = ?10,
                        last_trade_at = ?11,
                        updated_at = ?12
                     WHERE wallet_address = ?1 AND updated_at = ?13",
                    rusqlite::params![
                        a.wallet_address,
                        a.total_pnl,
                        a.total_pnl_usd.to_string(),
                        a.avg_pnl_per_token,
                        a.appearances,
                        a.total_trades,
                        a.winning_tokens,
                        a.avg_return,
                        a.win_rate,
                        tags,
                        fmt_ts(a.last_trade_at),
                        fmt_ts(a.updated_at),
                        fmt_ts(expected),
                    ],
                )?;
                if changed == 0 {
                    return Err(StoreError::Conflict(a.wallet_address.clone()).into());
                }
            }
        }
    }
    Ok(writes.len())
}
