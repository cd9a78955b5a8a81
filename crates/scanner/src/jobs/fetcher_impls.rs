use anyhow::Result;
use common::provider::{classify_api_error, MarketDataClient};
use common::types::{ApiRankedToken, ApiTopTrader, TokenRankingQuery, TradingPeriod, TrendingToken};
use std::time::Instant;

use super::fetcher_traits::*;

fn record_api_call<T>(endpoint: &'static str, start: Instant, res: &Result<T>) {
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("signal_api_latency_ms", "endpoint" => endpoint).record(ms);
    match res {
        Ok(_) => {
            metrics::counter!("signal_api_requests_total", "endpoint" => endpoint, "status" => "ok").increment(1);
        }
        Err(e) => {
            metrics::counter!("signal_api_requests_total", "endpoint" => endpoint, "status" => "error").increment(1);
            metrics::counter!(
                "signal_api_errors_total",
                "endpoint" => endpoint,
                "kind" => classify_api_error(e).as_str()
            )
            .increment(1);
        }
    }
}

impl TokenRanker for MarketDataClient {
    async fn ranked_tokens(&self, query: &TokenRankingQuery) -> Result<Vec<TrendingToken>> {
        let start = Instant::now();
        let res = self.fetch_ranked_tokens(query).await;
        record_api_call("filter_tokens", start, &res);
        Ok(res?
            .into_iter()
            .filter_map(ApiRankedToken::into_trending)
            .collect())
    }
}

impl TopTradersFetcher for MarketDataClient {
    async fn top_traders(
        &self,
        token_address: &str,
        period: TradingPeriod,
        limit: u32,
    ) -> Result<Vec<ApiTopTrader>> {
        let start = Instant::now();
        let res = self.fetch_top_traders(token_address, period, limit).await;
        record_api_call("token_top_traders", start, &res);
        res
    }
}
