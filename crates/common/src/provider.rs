use crate::types::{
    ApiRankedToken, ApiTopTrader, FilterTokensData, GraphQlResponse, TokenRankingQuery,
    TopTradersData, TradingPeriod,
};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const FILTER_TOKENS_QUERY: &str = "query FilterTokens($filters: TokenFilters, $rankings: [TokenRanking], $limit: Int) {
  filterTokens(filters: $filters, rankings: $rankings, limit: $limit) {
    results { token { address symbol name } change24 volume24 liquidity }
  }
}";

const TOP_TRADERS_QUERY: &str = "query TokenTopTraders($input: TokenTopTradersInput!) {
  tokenTopTraders(input: $input) {
    items {
      walletAddress realizedProfitUsd realizedProfitPercentage volumeUsd
      buys sells tokenBalance lastTransactionAt
    }
  }
}";

/// Failure classes for the `signal_api_errors_total{kind}` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Timeout,
    Connect,
    RateLimited,
    Http4xx,
    Http5xx,
    Decode,
    GraphQl,
    Other,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::RateLimited => "rate_limited",
            Self::Http4xx => "http_4xx",
            Self::Http5xx => "http_5xx",
            Self::Decode => "decode",
            Self::GraphQl => "graphql",
            Self::Other => "other",
        }
    }
}

/// Non-transport failures raised by the client itself.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider GraphQL error: {0}")]
    GraphQl(String),
    #[error("provider response had no data")]
    EmptyData,
}

pub fn classify_api_error(err: &anyhow::Error) -> ApiErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ProviderError>() {
            return match e {
                ProviderError::Status { status: 429, .. } => ApiErrorKind::RateLimited,
                ProviderError::Status { status, .. } if *status >= 500 => ApiErrorKind::Http5xx,
                ProviderError::Status { .. } => ApiErrorKind::Http4xx,
                ProviderError::GraphQl(_) | ProviderError::EmptyData => ApiErrorKind::GraphQl,
            };
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() {
                return ApiErrorKind::Timeout;
            }
            if e.is_connect() {
                return ApiErrorKind::Connect;
            }
            if e.is_decode() {
                return ApiErrorKind::Decode;
            }
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ApiErrorKind::Decode;
        }
    }
    ApiErrorKind::Other
}

/// Client for the market-data provider's GraphQL endpoint.
pub struct MarketDataClient {
    api_url: String,
    api_key: String,
    network_id: i64,
    client: reqwest::Client,
}

impl MarketDataClient {
    pub fn new(api_url: &str, api_key: &str, network_id: i64, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            network_id,
            client,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn network_id(&self) -> i64 {
        self.network_id
    }

    pub async fn fetch_ranked_tokens(&self, query: &TokenRankingQuery) -> Result<Vec<ApiRankedToken>> {
        let data: FilterTokensData = self.post_graphql(ranked_tokens_body(query)).await?;
        Ok(data.filter_tokens.map(|r| r.results).unwrap_or_default())
    }

    pub async fn fetch_top_traders(
        &self,
        token_address: &str,
        period: TradingPeriod,
        limit: u32,
    ) -> Result<Vec<ApiTopTrader>> {
        let body = top_traders_body(token_address, self.network_id, period, limit);
        let data: TopTradersData = self.post_graphql(body).await?;
        Ok(data.token_top_traders.map(|r| r.items).unwrap_or_default())
    }

    async fn post_graphql<T: DeserializeOwned>(&self, body: Value) -> Result<T> {
        debug!(url = %self.api_url, "posting provider query");

        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("provider request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let bytes = resp.bytes().await.context("failed to read provider response")?;
        decode_graphql(&bytes)
    }
}

/// Unwrap a GraphQL envelope; a non-empty `errors` array wins over partial data.
pub fn decode_graphql<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: GraphQlResponse<T> =
        serde_json::from_slice(bytes).context("failed to deserialize provider response")?;
    if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
        let msg = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ProviderError::GraphQl(msg).into());
    }
    envelope.data.ok_or_else(|| ProviderError::EmptyData.into())
}

pub fn ranked_tokens_body(query: &TokenRankingQuery) -> Value {
    let mut change = serde_json::Map::new();
    if let Some(min) = query.min_change_24h_pct {
        change.insert("gte".to_string(), json!(min));
    }
    if let Some(max) = query.max_change_24h_pct {
        change.insert("lte".to_string(), json!(max));
    }

    let mut filters = json!({
        "network": [query.network_id],
        "liquidity": { "gte": query.min_liquidity_usd },
        "volume24": { "gte": query.min_volume_24h_usd },
    });
    if !change.is_empty() {
        filters["change24"] = Value::Object(change);
    }

    json!({
        "query": FILTER_TOKENS_QUERY,
        "variables": {
            "filters": filters,
            "rankings": [{
                "attribute": query.attribute.as_str(),
                "direction": query.direction.as_str(),
            }],
            "limit": query.limit,
        }
    })
}

pub fn top_traders_body(
    token_address: &str,
    network_id: i64,
    period: TradingPeriod,
    limit: u32,
) -> Value {
    json!({
        "query": TOP_TRADERS_QUERY,
        "variables": {
            "input": {
                "tokenAddress": token_address,
                "networkId": network_id,
                "tradingPeriod": period.as_str(),
                "limit": limit,
            }
        }
    })
}
