use serde::{Deserialize, Deserializer};

/// Attribute the provider ranks tokens by in `filterTokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RankingAttribute {
    #[serde(rename = "change24")]
    Change24,
    #[serde(rename = "volume24")]
    Volume24,
    #[serde(rename = "liquidity")]
    Liquidity,
    #[serde(rename = "trendingScore24")]
    TrendingScore24,
}

impl RankingAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Change24 => "change24",
            Self::Volume24 => "volume24",
            Self::Liquidity => "liquidity",
            Self::TrendingScore24 => "trendingScore24",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RankingDirection {
    Asc,
    Desc,
}

impl RankingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Trading window for the top-traders query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingPeriod {
    Day,
    Week,
    Month,
}

impl TradingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Week => "WEEK",
            Self::Month => "MONTH",
        }
    }
}

/// Token ranking request, one per discovery strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRankingQuery {
    pub network_id: i64,
    pub min_liquidity_usd: f64,
    pub min_volume_24h_usd: f64,
    pub min_change_24h_pct: Option<f64>,
    pub max_change_24h_pct: Option<f64>,
    pub attribute: RankingAttribute,
    pub direction: RankingDirection,
    pub limit: u32,
}

/// Ranked token from `filterTokens`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRankedToken {
    pub token: Option<ApiTokenInfo>,
    #[serde(deserialize_with = "de_opt_f64_any", default)]
    pub change24: Option<f64>,
    #[serde(deserialize_with = "de_opt_f64_any", default)]
    pub volume24: Option<f64>,
    #[serde(deserialize_with = "de_opt_f64_any", default)]
    pub liquidity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTokenInfo {
    pub address: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

/// Flattened token record handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendingToken {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub change_24h: f64,
    pub volume_24h: f64,
    pub liquidity: f64,
}

impl ApiRankedToken {
    /// Records without a token address are dropped.
    pub fn into_trending(self) -> Option<TrendingToken> {
        let info = self.token?;
        let address = info.address.filter(|a| !a.is_empty())?;
        Some(TrendingToken {
            symbol: info.symbol.unwrap_or_else(|| "???".to_string()),
            name: info.name.unwrap_or_default(),
            address,
            change_24h: self.change24.unwrap_or(0.0),
            volume_24h: self.volume24.unwrap_or(0.0),
            liquidity: self.liquidity.unwrap_or(0.0),
        })
    }
}

/// Trader from `tokenTopTraders`. USD amounts arrive as numeric strings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiTopTrader {
    #[serde(rename = "walletAddress")]
    pub wallet_address: Option<String>,
    #[serde(
        rename = "realizedProfitUsd",
        deserialize_with = "de_opt_string_any",
        default
    )]
    pub realized_profit_usd: Option<String>,
    #[serde(
        rename = "realizedProfitPercentage",
        deserialize_with = "de_opt_f64_any",
        default
    )]
    pub realized_profit_percentage: Option<f64>,
    #[serde(rename = "volumeUsd", deserialize_with = "de_opt_string_any", default)]
    pub volume_usd: Option<String>,
    #[serde(deserialize_with = "de_opt_u32_any", default)]
    pub buys: Option<u32>,
    #[serde(deserialize_with = "de_opt_u32_any", default)]
    pub sells: Option<u32>,
    #[serde(
        rename = "tokenBalance",
        deserialize_with = "de_opt_string_any",
        default
    )]
    pub token_balance: Option<String>,
    #[serde(
        rename = "lastTransactionAt",
        deserialize_with = "de_opt_i64_any",
        default
    )]
    pub last_transaction_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterTokensData {
    #[serde(rename = "filterTokens")]
    pub filter_tokens: Option<FilterTokensResults>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterTokensResults {
    #[serde(default)]
    pub results: Vec<ApiRankedToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopTradersData {
    #[serde(rename = "tokenTopTraders")]
    pub token_top_traders: Option<TopTradersItems>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopTradersItems {
    #[serde(default)]
    pub items: Vec<ApiTopTrader>,
}

/// Deserialize a field that can be either a string or a number into Option<String>.
fn de_opt_string_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Like [`de_opt_string_any`], but parses to f64. Unparseable strings become None.
fn de_opt_f64_any<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite()))
}

/// Counts may arrive as `3`, `"3"` or `3.0`. Negative or fractional values become None.
fn de_opt_u32_any<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_f64_any(deserializer)?
        .filter(|x| x.fract() == 0.0 && *x >= 0.0 && *x <= f64::from(u32::MAX))
        .map(|x| x as u32))
}

/// Unix seconds; float timestamps are truncated.
fn de_opt_i64_any<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|x| x.is_finite()).map(|x| x as i64)),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|x| x.is_finite())
                    .map(|x| x as i64)
            })
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(RankingAttribute::Change24.as_str(), "change24");
        assert_eq!(RankingAttribute::TrendingScore24.as_str(), "trendingScore24");
        assert_eq!(RankingDirection::Desc.as_str(), "DESC");
        assert_eq!(TradingPeriod::Week.as_str(), "WEEK");
    }

    #[test]
    fn test_parse_top_trader_accepts_strings_and_numbers() {
        let json = r#"{
            "walletAddress": "Wa11et",
            "realizedProfitUsd": "6000.5",
            "realizedProfitPercentage": 120.25,
            "volumeUsd": 15000,
            "buys": 3,
            "sells": 2,
            "tokenBalance": "0",
            "lastTransactionAt": 1700000000
        }"#;
        let t: ApiTopTrader = serde_json::from_str(json).unwrap();
        assert_eq!(t.wallet_address.as_deref(), Some("Wa11et"));
        assert_eq!(t.realized_profit_usd.as_deref(), Some("6000.5"));
        assert_eq!(t.realized_profit_percentage, Some(120.25));
        assert_eq!(t.volume_usd.as_deref(), Some("15000"));
        assert_eq!(t.buys, Some(3));
    }

    #[test]
    fn test_parse_top_trader_tolerates_missing_and_garbage_fields() {
        let json = r#"{"walletAddress":"W","realizedProfitPercentage":"n/a","volumeUsd":null}"#;
        let t: ApiTopTrader = serde_json::from_str(json).unwrap();
        assert_eq!(t.realized_profit_percentage, None);
        assert_eq!(t.realized_profit_usd, None);
        assert_eq!(t.volume_usd, None);
        assert_eq!(t.sells, None);
    }

    #[test]
    fn test_one_malformed_trader_does_not_poison_the_list() {
        let json = r#"{"items":[
            {"walletAddress":"GOOD","realizedProfitUsd":"6000","realizedProfitPercentage":120,
             "buys":3,"sells":2,"lastTransactionAt":1700000000},
            {"walletAddress":"ODD","realizedProfitUsd":"10","realizedProfitPercentage":10,
             "buys":"3","sells":"lots","lastTransactionAt":1700000000.75},
            {"walletAddress":"NEG","buys":-1,"sells":2.5,"lastTransactionAt":"1700000001"}
        ]}"#;
        let items: TopTradersItems = serde_json::from_str(json).unwrap();
        assert_eq!(items.items.len(), 3);

        let good = &items.items[0];
        assert_eq!(good.realized_profit_usd.as_deref(), Some("6000"));
        assert_eq!((good.buys, good.sells), (Some(3), Some(2)));

        let odd = &items.items[1];
        assert_eq!(odd.buys, Some(3));
        assert_eq!(odd.sells, None);
        assert_eq!(odd.last_transaction_at, Some(1_700_000_000));

        let neg = &items.items[2];
        assert_eq!((neg.buys, neg.sells), (None, None));
        assert_eq!(neg.last_transaction_at, Some(1_700_000_001));
    }

    #[test]
    fn test_ranked_token_without_address_is_dropped() {
        let json = r#"[
            {"token":{"address":"Tok1","symbol":"AAA","name":"Alpha"},"change24":"0.35","volume24":"120000","liquidity":50000},
            {"token":{"symbol":"BBB"},"change24":1.0},
            {"change24":1.0}
        ]"#;
        let tokens: Vec<ApiRankedToken> = serde_json::from_str(json).unwrap();
        let flat: Vec<TrendingToken> = tokens
            .into_iter()
            .filter_map(ApiRankedToken::into_trending)
            .collect();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].address, "Tok1");
        assert!((flat[0].change_24h - 0.35).abs() < 1e-9);
        assert!((flat[0].liquidity - 50000.0).abs() < 1e-9);
    }
}
