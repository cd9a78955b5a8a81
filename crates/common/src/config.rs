use anyhow::Result;
use serde::Deserialize;
use std::str::FromStr;

use crate::types::{RankingAttribute, RankingDirection, TradingPeriod};

/// Environment variable consulted when `[provider].api_key` is absent.
pub const PROVIDER_API_KEY_ENV: &str = "SIGNAL_PROVIDER_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub database: Database,
    pub scan: Scan,
    pub tags: Tags,
    pub provider: Provider,
    pub observability: Observability,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scan {
    pub tokens_to_scan: usize,
    pub traders_per_token: u32,
    pub trading_period: TradingPeriod,
    pub min_trades_to_save: u32,
    pub min_profit_usd: f64,
    pub min_profit_percent: f64,
    pub rate_limit_delay_ms: u64,
    pub refresh_interval_secs: u64,
    pub strategies: Vec<RankingStrategy>,
}

/// One way of asking the provider for trending tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RankingStrategy {
    pub name: String,
    pub attribute: RankingAttribute,
    pub direction: RankingDirection,
    pub min_liquidity_usd: f64,
    pub min_volume_24h_usd: f64,
    #[serde(default)]
    pub min_change_24h_pct: Option<f64>,
    #[serde(default)]
    pub max_change_24h_pct: Option<f64>,
    pub limit: u32,
}

/// Tag thresholds. Appearance rules are inclusive (>=), money/percent/trade rules strict (>).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tags {
    pub consistent_min_appearances: u32,
    pub multi_winner_min_appearances: u32,
    pub whale_min_pnl_usd: f64,
    pub high_pnl_min_pnl_usd: f64,
    pub ten_x_min_pnl_percent: f64,
    pub active_min_trades: u32,
    pub smart_money_min_appearances: u32,
    pub smart_money_min_pnl_usd: f64,
}

impl Default for Tags {
    fn default() -> Self {
        Self {
            consistent_min_appearances: 5,
            multi_winner_min_appearances: 3,
            whale_min_pnl_usd: 10_000.0,
            high_pnl_min_pnl_usd: 1_000.0,
            ten_x_min_pnl_percent: 500.0,
            active_min_trades: 30,
            smart_money_min_appearances: 2,
            smart_money_min_pnl_usd: 500.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Provider {
    pub api_url: String,
    pub network_id: i64,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Provider {
    /// Configured key, else the environment. Empty strings count as unset.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(PROVIDER_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observability {
    pub prometheus_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        let content = std::fs::read_to_string("config/default.toml")?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_default_config() {
        let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.scan.trading_period, TradingPeriod::Week);
        assert!(config.scan.strategies.len() >= 2);
        assert!(config.scan.tokens_to_scan > 0);
        assert_eq!(config.provider.network_id, 1_399_811_149);
    }

    #[test]
    fn test_default_tag_thresholds_match_config_file() {
        let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.tags, Tags::default());
    }

    #[test]
    fn test_strategy_change_window_is_optional() {
        let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        let volume = config
            .scan
            .strategies
            .iter()
            .find(|s| s.name == "top_volume")
            .expect("top_volume strategy should be present");
        assert_eq!(volume.attribute, RankingAttribute::Volume24);
        assert_eq!(volume.direction, RankingDirection::Desc);
        assert!(volume.max_change_24h_pct.is_none());
    }

    #[test]
    fn test_empty_api_key_counts_as_unset() {
        let provider = Provider {
            api_url: "https://graph.example.com/graphql".to_string(),
            network_id: 1,
            api_key: Some("   ".to_string()),
            timeout_secs: 10,
        };
        // Only meaningful when the env var is not set in the test environment.
        if std::env::var(PROVIDER_API_KEY_ENV).is_err() {
            assert!(provider.resolved_api_key().is_none());
        }
    }

    #[test]
    fn test_bad_trading_period_rejected() {
        let toml = include_str!("../../../config/default.toml")
            .replace("trading_period = \"WEEK\"", "trading_period = \"YEAR\"");
        assert!(Config::from_toml_str(&toml).is_err());
    }
}
