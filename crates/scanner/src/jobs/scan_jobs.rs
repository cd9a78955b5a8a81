use anyhow::Result;
use chrono::{DateTime, Utc};
use common::config::{Config, RankingStrategy, Tags};
use common::db::AsyncDb;
use common::types::{TradingPeriod, TrendingToken};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::aggregation::{aggregate_by_wallet, merge_aggregate};
use crate::sightings::{dedup_sightings, qualify, wallets_in, HistoryEntry, QualifyRules, Sighting};
use crate::token_selection::{
    merge_unique, select_tokens, strategy_query, RandomShuffler, TokenShuffler,
};

use super::fetcher_traits::ScanProvider;
use super::store::{fmt_ts, ScanStore, WalletWrite};
use super::tracker::JobTracker;

pub const SCAN_JOB_NAME: &str = "wallet_scan";
const MIN_STRATEGIES: usize = 2;

/// Run-level failures. Rendered into a failed [`ScanReport`], never returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanFailure {
    #[error("market data provider is not configured")]
    ProviderNotConfigured,
    #[error("scan store is not configured")]
    StoreNotConfigured,
    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),
    #[error("scan cancelled before any writes")]
    Cancelled,
    #[error("failed to read stored wallet state: {0}")]
    StoreRead(String),
    #[error("wallet upsert failed: {0}")]
    WalletUpsert(String),
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub network_id: i64,
    pub strategies: Vec<RankingStrategy>,
    pub tokens_to_scan: usize,
    pub traders_per_token: u32,
    pub trading_period: TradingPeriod,
    pub rules: QualifyRules,
    pub tags: Tags,
    pub rate_limit_delay: Duration,
}

impl ScanSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            network_id: cfg.provider.network_id,
            strategies: cfg.scan.strategies.clone(),
            tokens_to_scan: cfg.scan.tokens_to_scan,
            traders_per_token: cfg.scan.traders_per_token,
            trading_period: cfg.scan.trading_period,
            rules: QualifyRules::from(&cfg.scan),
            tags: cfg.tags.clone(),
            rate_limit_delay: Duration::from_millis(cfg.scan.rate_limit_delay_ms),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ScanFailure> {
        if self.strategies.len() < MIN_STRATEGIES {
            return Err(ScanFailure::InvalidConfig(format!(
                "need at least {MIN_STRATEGIES} ranking strategies, got {}",
                self.strategies.len()
            )));
        }
        if let Some(s) = self.strategies.iter().find(|s| s.limit == 0) {
            return Err(ScanFailure::InvalidConfig(format!(
                "strategy {} has limit 0",
                s.name
            )));
        }
        if self.tokens_to_scan == 0 {
            return Err(ScanFailure::InvalidConfig(
                "tokens_to_scan must be positive".to_string(),
            ));
        }
        if self.traders_per_token == 0 {
            return Err(ScanFailure::InvalidConfig(
                "traders_per_token must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub success: bool,
    pub message: String,
    pub tokens_scanned: usize,
    pub new_findings: usize,
    pub wallets_updated: usize,
    pub timestamp: DateTime<Utc>,
}

impl ScanReport {
    fn succeeded(outcome: &ScanOutcome, timestamp: DateTime<Utc>) -> Self {
        let message = if outcome.new_findings == 0 {
            format!(
                "no new wallet-token pairs across {} tokens",
                outcome.tokens_scanned
            )
        } else {
            format!(
                "found {} new wallet-token pairs across {} tokens, updated {} wallets",
                outcome.new_findings, outcome.tokens_scanned, outcome.wallets_updated
            )
        };
        Self {
            success: true,
            message,
            tokens_scanned: outcome.tokens_scanned,
            new_findings: outcome.new_findings,
            wallets_updated: outcome.wallets_updated,
            timestamp,
        }
    }

    fn failed(failure: &ScanFailure, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            message: failure.to_string(),
            tokens_scanned: 0,
            new_findings: 0,
            wallets_updated: 0,
            timestamp,
        }
    }
}

#[derive(Debug, Default)]
struct ScanOutcome {
    tokens_scanned: usize,
    new_findings: usize,
    wallets_updated: usize,
}

/// One discovery pass: trending tokens, top traders, dedup, merge, persist.
///
/// Cancellation is observed only while talking to the provider. Wallet
/// aggregates and their history rows are committed in one store call.
pub async fn run_scan_once<P, S, R>(
    provider: Option<&P>,
    store: Option<&S>,
    shuffler: &mut R,
    settings: &ScanSettings,
    cancel: &CancellationToken,
) -> ScanReport
where
    P: ScanProvider,
    S: ScanStore + Sync,
    R: TokenShuffler + Send + ?Sized,
{
    let res = scan(provider, store, shuffler, settings, cancel).await;
    let now = Utc::now();
    match res {
        Ok(outcome) => ScanReport::succeeded(&outcome, now),
        Err(failure) => {
            tracing::error!(error = %failure, "wallet_scan: failed");
            ScanReport::failed(&failure, now)
        }
    }
}

async fn scan<P, S, R>(
    provider: Option<&P>,
    store: Option<&S>,
    shuffler: &mut R,
    settings: &ScanSettings,
    cancel: &CancellationToken,
) -> std::result::Result<ScanOutcome, ScanFailure>
where
    P: ScanProvider,
    S: ScanStore + Sync,
    R: TokenShuffler + Send + ?Sized,
{
    let provider = provider.ok_or(ScanFailure::ProviderNotConfigured)?;
    let store = store.ok_or(ScanFailure::StoreNotConfigured)?;
    settings.validate()?;

    let now = Utc::now();
    let tokens = fetch_tokens(provider, shuffler, settings, cancel).await?;
    let mut outcome = ScanOutcome {
        tokens_scanned: tokens.len(),
        ..ScanOutcome::default()
    };
    if tokens.is_empty() {
        tracing::info!("wallet_scan: no trending tokens");
        return Ok(outcome);
    }

    let sightings = collect_sightings(provider, &tokens, settings, cancel, now).await?;
    if cancel.is_cancelled() {
        return Err(ScanFailure::Cancelled);
    }
    if sightings.is_empty() {
        tracing::info!(tokens = tokens.len(), "wallet_scan: no qualifying traders");
        return Ok(outcome);
    }

    let known = store
        .known_pairs(&wallets_in(&sightings))
        .await
        .map_err(|e| ScanFailure::StoreRead(format!("{e:#}")))?;
    let (fresh, duplicates) = dedup_sightings(sightings, &known);
    metrics::counter!("signal_sightings_duplicate_total").increment(duplicates as u64);
    metrics::counter!("signal_sightings_new_total").increment(fresh.len() as u64);
    tracing::info!(
        new = fresh.len(),
        duplicates,
        newest_trade = ?fresh.iter().map(|s| s.last_trade_at).max(),
        "wallet_scan: deduplicated sightings"
    );
    if fresh.is_empty() {
        return Ok(outcome);
    }
    outcome.new_findings = fresh.len();

    let partials = aggregate_by_wallet(&fresh);
    let touched: Vec<String> = partials.keys().cloned().collect();
    let existing = store
        .load_wallets(&touched)
        .await
        .map_err(|e| ScanFailure::StoreRead(format!("{e:#}")))?;

    let writes: Vec<WalletWrite> = partials
        .iter()
        .map(|(wallet, partial)| {
            let prev = existing.get(wallet);
            WalletWrite {
                next: merge_aggregate(wallet, partial, prev, now, &settings.tags),
                expected_updated_at: prev.map(|a| a.updated_at),
            }
        })
        .collect();

    let history: Vec<HistoryEntry> = fresh
        .iter()
        .map(|s| HistoryEntry::from_sighting(s, now))
        .collect();
    let attempted = history.len();
    let committed = store
        .commit_scan(writes, history)
        .await
        .map_err(|e| ScanFailure::WalletUpsert(format!("{e:#}")))?;
    outcome.wallets_updated = committed.wallets_updated;
    metrics::counter!("signal_wallets_updated_total").increment(outcome.wallets_updated as u64);
    match committed.history {
        Ok(inserted) => {
            tracing::info!(inserted, attempted, "wallet_scan: history recorded");
        }
        Err(error) => {
            metrics::counter!("signal_history_insert_failures_total").increment(1);
            tracing::error!(%error, attempted, "wallet_scan: history insert failed");
        }
    }

    Ok(outcome)
}

async fn fetch_tokens<P, R>(
    provider: &P,
    shuffler: &mut R,
    settings: &ScanSettings,
    cancel: &CancellationToken,
) -> std::result::Result<Vec<TrendingToken>, ScanFailure>
where
    P: ScanProvider,
    R: TokenShuffler + Send + ?Sized,
{
    let mut lists = Vec::with_capacity(settings.strategies.len());
    for strategy in &settings.strategies {
        if cancel.is_cancelled() {
            return Err(ScanFailure::Cancelled);
        }
        let query = strategy_query(strategy, settings.network_id);
        match provider.ranked_tokens(&query).await {
            Ok(tokens) => {
                tracing::info!(
                    strategy = %strategy.name,
                    tokens = tokens.len(),
                    "wallet_scan: ranked tokens"
                );
                lists.push(tokens);
            }
            Err(e) => {
                tracing::warn!(strategy = %strategy.name, error = %e, "wallet_scan: ranking query failed");
            }
        }
    }
    Ok(select_tokens(
        merge_unique(lists),
        shuffler,
        settings.tokens_to_scan,
    ))
}

async fn collect_sightings<P: ScanProvider>(
    provider: &P,
    tokens: &[TrendingToken],
    settings: &ScanSettings,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
) -> std::result::Result<Vec<Sighting>, ScanFailure> {
    let mut out = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        if idx > 0 && !settings.rate_limit_delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(ScanFailure::Cancelled),
                () = tokio::time::sleep(settings.rate_limit_delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(ScanFailure::Cancelled);
        }

        let traders = match provider
            .top_traders(
                &token.address,
                settings.trading_period,
                settings.traders_per_token,
            )
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(token = %token.address, error = %e, "wallet_scan: top traders failed");
                continue;
            }
        };

        let before = out.len();
        out.extend(
            traders
                .iter()
                .filter_map(|t| qualify(t, token, &settings.rules, now)),
        );
        tracing::debug!(
            token = %token.address,
            symbol = %token.symbol,
            traders = traders.len(),
            qualified = out.len() - before,
            "wallet_scan: token scanned"
        );
    }
    Ok(out)
}

async fn record_scan_run(db: &AsyncDb, report: &ScanReport) -> Result<()> {
    let r = report.clone();
    db.call_named("wallet_scan.insert_scan_run", move |conn| {
        conn.execute(
            "INSERT INTO scan_runs (success, message, tokens_scanned, new_findings, wallets_updated, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                r.success,
                r.message,
                r.tokens_scanned as i64,
                r.new_findings as i64,
                r.wallets_updated as i64,
                fmt_ts(r.timestamp),
            ],
        )?;
        Ok(())
    })
    .await
}

async fn count_tracked_wallets(db: &AsyncDb) -> Result<i64> {
    db.call_named("wallet_scan.count_wallets", |conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM wallets", [], |row| row.get(0))?)
    })
    .await
}

/// Scheduled entry point: wraps [`run_scan_once`] with job tracking, the
/// `scan_runs` log and run-level metrics. `Err` means bookkeeping failed.
pub async fn run_scan_job<P: ScanProvider>(
    db: &AsyncDb,
    provider: Option<&P>,
    cfg: &Config,
    cancel: &CancellationToken,
) -> Result<ScanReport> {
    let tracker = JobTracker::start(db, SCAN_JOB_NAME).await?;
    let settings = ScanSettings::from_config(cfg);
    let mut shuffler = RandomShuffler::from_entropy();

    let report = run_scan_once(provider, Some(db), &mut shuffler, &settings, cancel).await;

    record_scan_run(db, &report).await?;
    let status = if report.success { "ok" } else { "failed" };
    metrics::counter!("signal_scans_total", "status" => status).increment(1);
    match count_tracked_wallets(db).await {
        Ok(n) => metrics::gauge!("signal_wallets_tracked").set(n as f64),
        Err(e) => tracing::warn!(error = %e, "wallet_scan: count wallets failed"),
    }

    let meta = serde_json::to_value(&report)?;
    if report.success {
        tracker.success(Some(meta)).await?;
    } else {
        tracker.fail(&report.message, Some(meta)).await?;
    }
    Ok(report)
}
