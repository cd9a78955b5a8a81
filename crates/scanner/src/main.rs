use anyhow::Result;
use common::config::Config;
use common::provider::MarketDataClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

mod aggregation;
mod cli;
mod jobs;
mod metrics;
mod scheduler;
mod sightings;
mod tags;
mod token_selection;

/// None when no API key is configured; scans then report a failure instead of erroring.
fn build_provider(cfg: &Config) -> Result<Option<MarketDataClient>> {
    let Some(api_key) = cfg.provider.resolved_api_key() else {
        return Ok(None);
    };
    let client = MarketDataClient::new(
        &cfg.provider.api_url,
        &api_key,
        cfg.provider.network_id,
        Duration::from_secs(cfg.provider.timeout_secs),
    )?;
    Ok(Some(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    let _otel_guard =
        common::observability::init_global("signal-scanner", &config.general.log_level)?;

    tracing::info!("signal scanner starting");

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Read-only commands use the sync Database and exit immediately.
    let cmd = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;
    if !matches!(cmd, cli::Command::Run | cli::Command::Scan) {
        let db = common::db::Database::open(&config.database.path)?;
        db.run_migrations()?;
        cli::run_command(&db, &config, cmd)?;
        return Ok(());
    }

    let db = common::db::AsyncDb::open(&config.database.path).await?;
    let provider = build_provider(&config)?;
    if provider.is_none() {
        tracing::warn!(
            env = common::config::PROVIDER_API_KEY_ENV,
            "no provider API key configured; scans will report failure"
        );
    }

    if cmd == cli::Command::Scan {
        let report =
            jobs::run_scan_job(&db, provider.as_ref(), &config, &CancellationToken::new()).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    metrics::install_prometheus(config.observability.prometheus_port)?;
    metrics::describe();

    let cfg = Arc::new(config);
    let provider = Arc::new(provider);
    let cancel = CancellationToken::new();
    let (scan_tx, mut scan_rx) = tokio::sync::mpsc::channel::<()>(8);

    let worker = tokio::spawn({
        let db = db.clone();
        let cfg = cfg.clone();
        let provider = provider.clone();
        let cancel = cancel.clone();
        async move {
            while scan_rx.recv().await.is_some() {
                if cancel.is_cancelled() {
                    break;
                }
                let span = tracing::info_span!("job_run", job = jobs::SCAN_JOB_NAME);
                match jobs::run_scan_job(&db, provider.as_ref().as_ref(), &cfg, &cancel)
                    .instrument(span)
                    .await
                {
                    Ok(r) if r.success => tracing::info!(
                        tokens = r.tokens_scanned,
                        new_findings = r.new_findings,
                        wallets_updated = r.wallets_updated,
                        "wallet_scan done"
                    ),
                    Ok(r) => tracing::warn!(message = %r.message, "wallet_scan reported failure"),
                    Err(e) => tracing::error!(error = %e, "wallet_scan bookkeeping failed"),
                }
            }
        }
    });

    let scheduler_handles = scheduler::start(vec![scheduler::JobSpec {
        name: jobs::SCAN_JOB_NAME.to_string(),
        interval: Duration::from_secs(cfg.scan.refresh_interval_secs),
        tick: scan_tx,
        run_immediately: true,
    }]);
    tracing::info!(
        interval_secs = cfg.scan.refresh_interval_secs,
        "scheduler started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    cancel.cancel();
    for h in &scheduler_handles {
        h.abort();
    }

    // A commit already handed to the SQLite thread finishes even if the worker is dropped.
    if tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .is_err()
    {
        tracing::warn!("scan worker still busy after 5s; exiting");
    }

    Ok(())
}
