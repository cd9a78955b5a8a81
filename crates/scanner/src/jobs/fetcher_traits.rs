use anyhow::Result;
use common::types::{ApiTopTrader, TokenRankingQuery, TradingPeriod, TrendingToken};

pub trait TokenRanker {
    /// Tokens matching one ranking strategy. Records without a usable token are skipped.
    fn ranked_tokens(
        &self,
        query: &TokenRankingQuery,
    ) -> impl std::future::Future<Output = Result<Vec<TrendingToken>>> + Send;
}

pub trait TopTradersFetcher {
    fn top_traders(
        &self,
        token_address: &str,
        period: TradingPeriod,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ApiTopTrader>>> + Send;
}

/// Everything a scan needs from the market-data side.
pub trait ScanProvider: TokenRanker + TopTradersFetcher + Sync {}

impl<T: TokenRanker + TopTradersFetcher + Sync> ScanProvider for T {}
