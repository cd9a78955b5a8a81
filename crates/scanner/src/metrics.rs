use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!("signal_scans_total", "Completed wallet scans by status.");
    describe_counter!(
        "signal_sightings_new_total",
        "Qualifying (wallet, token) sightings not seen before."
    );
    describe_counter!(
        "signal_sightings_duplicate_total",
        "Sightings dropped because the pair was already recorded."
    );
    describe_counter!(
        "signal_wallets_updated_total",
        "Wallet aggregates written by scans."
    );
    describe_counter!(
        "signal_history_insert_failures_total",
        "Scans whose discovery history insert failed."
    );
    describe_gauge!("signal_wallets_tracked", "Wallets currently tracked.");
    describe_counter!(
        "signal_api_requests_total",
        "Market data provider requests."
    );
    describe_counter!(
        "signal_api_errors_total",
        "Market data provider errors by kind."
    );
    describe_histogram!(
        "signal_api_latency_ms",
        "Provider request latency in milliseconds."
    );
    describe_histogram!(
        "signal_db_query_latency_ms",
        "SQLite operation latency in milliseconds."
    );
    describe_counter!("signal_db_query_errors_total", "Failed SQLite operations.");
}

/// Install the global recorder and serve `/metrics` on `port`. Needs a Tokio runtime.
pub fn install_prometheus(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}
