use common::config::RankingStrategy;
use common::types::{TokenRankingQuery, TrendingToken};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;

pub fn strategy_query(strategy: &RankingStrategy, network_id: i64) -> TokenRankingQuery {
    TokenRankingQuery {
        network_id,
        min_liquidity_usd: strategy.min_liquidity_usd,
        min_volume_24h_usd: strategy.min_volume_24h_usd,
        min_change_24h_pct: strategy.min_change_24h_pct,
        max_change_24h_pct: strategy.max_change_24h_pct,
        attribute: strategy.attribute,
        direction: strategy.direction,
        limit: strategy.limit,
    }
}

/// Concatenate strategy results keeping the first record seen per token address.
pub fn merge_unique(lists: Vec<Vec<TrendingToken>>) -> Vec<TrendingToken> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|t| !t.address.is_empty() && seen.insert(t.address.clone()))
        .collect()
}

/// Ordering source for the merged token set.
pub trait TokenShuffler {
    fn shuffle(&mut self, tokens: &mut [TrendingToken]);
}

pub struct RandomShuffler {
    rng: StdRng,
}

impl RandomShuffler {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl TokenShuffler for RandomShuffler {
    fn shuffle(&mut self, tokens: &mut [TrendingToken]) {
        tokens.shuffle(&mut self.rng);
    }
}

/// Leaves provider order untouched.
#[cfg(test)]
pub struct IdentityShuffler;

#[cfg(test)]
impl TokenShuffler for IdentityShuffler {
    fn shuffle(&mut self, _tokens: &mut [TrendingToken]) {}
}

pub fn select_tokens<R: TokenShuffler + ?Sized>(
    mut tokens: Vec<TrendingToken>,
    shuffler: &mut R,
    cap: usize,
) -> Vec<TrendingToken> {
    shuffler.shuffle(&mut tokens);
    tokens.truncate(cap);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{RankingAttribute, RankingDirection};

    fn token(address: &str) -> TrendingToken {
        TrendingToken {
            address: address.to_string(),
            symbol: address.to_uppercase(),
            name: String::new(),
            change_24h: 0.0,
            volume_24h: 0.0,
            liquidity: 0.0,
        }
    }

    fn addresses(tokens: &[TrendingToken]) -> Vec<&str> {
        tokens.iter().map(|t| t.address.as_str()).collect()
    }

    #[test]
    fn test_strategy_query_copies_filters() {
        let strategy = RankingStrategy {
            name: "top_gainers".to_string(),
            attribute: RankingAttribute::Change24,
            direction: RankingDirection::Desc,
            min_liquidity_usd: 10_000.0,
            min_volume_24h_usd: 50_000.0,
            min_change_24h_pct: Some(0.2),
            max_change_24h_pct: Some(50.0),
            limit: 50,
        };
        let q = strategy_query(&strategy, 1_399_811_149);
        assert_eq!(q.network_id, 1_399_811_149);
        assert_eq!(q.attribute, RankingAttribute::Change24);
        assert_eq!(q.max_change_24h_pct, Some(50.0));
        assert_eq!(q.limit, 50);
    }

    #[test]
    fn test_merge_unique_dedupes_by_address() {
        let mut dup = token("b");
        dup.symbol = "SECOND".to_string();
        let merged = merge_unique(vec![
            vec![token("a"), token("b")],
            vec![dup, token("c"), token("")],
        ]);
        assert_eq!(addresses(&merged), vec!["a", "b", "c"]);
        assert_eq!(merged[1].symbol, "B");
    }

    #[test]
    fn test_select_tokens_caps_after_shuffle() {
        let tokens: Vec<_> = ["a", "b", "c", "d"].iter().map(|a| token(a)).collect();
        let picked = select_tokens(tokens.clone(), &mut IdentityShuffler, 2);
        assert_eq!(addresses(&picked), vec!["a", "b"]);

        let all = select_tokens(tokens, &mut IdentityShuffler, 10);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_seeded_shuffler_is_deterministic() {
        let tokens: Vec<_> = (0..20).map(|i| token(&format!("t{i}"))).collect();
        let a = select_tokens(tokens.clone(), &mut RandomShuffler::seeded(7), 20);
        let b = select_tokens(tokens.clone(), &mut RandomShuffler::seeded(7), 20);
        assert_eq!(addresses(&a), addresses(&b));

        let mut sorted = addresses(&a);
        sorted.sort_unstable();
        let mut expected = addresses(&tokens);
        expected.sort_unstable();
        assert_eq!(sorted, expected);
    }
}
