use common::provider::MarketDataClient;
use common::types::{
    ApiRankedToken, RankingAttribute, RankingDirection, TokenRankingQuery, TradingPeriod,
};
use std::time::Duration;

const SOLANA: i64 = 1_399_811_149;

fn live_client() -> MarketDataClient {
    let key = std::env::var(common::config::PROVIDER_API_KEY_ENV)
        .expect("set SIGNAL_PROVIDER_API_KEY to run live provider tests");
    MarketDataClient::new(
        "https://graph.codex.io/graphql",
        &key,
        SOLANA,
        Duration::from_secs(20),
    )
    .unwrap()
}

#[tokio::test]
#[ignore] // requires network and an API key
async fn test_fetch_real_ranked_tokens() {
    let client = live_client();
    let tokens = client
        .fetch_ranked_tokens(&TokenRankingQuery {
            network_id: SOLANA,
            min_liquidity_usd: 50_000.0,
            min_volume_24h_usd: 250_000.0,
            min_change_24h_pct: None,
            max_change_24h_pct: None,
            attribute: RankingAttribute::Volume24,
            direction: RankingDirection::Desc,
            limit: 5,
        })
        .await
        .unwrap();
    assert!(!tokens.is_empty());
    assert!(tokens
        .into_iter()
        .filter_map(ApiRankedToken::into_trending)
        .all(|t| !t.address.is_empty()));
}

#[tokio::test]
#[ignore] // requires network and an API key
async fn test_fetch_real_top_traders_parses() {
    let client = live_client();
    // Wrapped SOL always has traders.
    let traders = client
        .fetch_top_traders(
            "So11111111111111111111111111111111111111112",
            TradingPeriod::Week,
            5,
        )
        .await
        .unwrap();
    assert!(traders.iter().all(|t| t.wallet_address.is_some()));
}
