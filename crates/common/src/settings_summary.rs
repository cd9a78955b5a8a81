use crate::config::Config;

fn fmt_f64(x: f64) -> String {
    if x.fract().abs() < f64::EPSILON {
        format!("{x:.0}")
    } else {
        let s = format!("{x:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// One line per scan stage (Tokens, Traders, Sightings, Tags) with the thresholds in effect.
pub fn scan_stage_infos(cfg: &Config) -> [String; 4] {
    let strategies = cfg
        .scan
        .strategies
        .iter()
        .map(|s| {
            format!(
                "{}({} {} liq>={} vol24>={})",
                s.name,
                s.attribute.as_str(),
                s.direction.as_str(),
                fmt_f64(s.min_liquidity_usd),
                fmt_f64(s.min_volume_24h_usd)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let tokens = format!(
        "Trending tokens from strategies=[{strategies}], shuffled and capped at tokens_to_scan={}.",
        cfg.scan.tokens_to_scan
    );

    let traders = format!(
        "Top traders per token: traders_per_token={} trading_period={} rate_limit_delay_ms={}.",
        cfg.scan.traders_per_token,
        cfg.scan.trading_period.as_str(),
        cfg.scan.rate_limit_delay_ms
    );

    let sightings = format!(
        "Sightings need profit_usd>{} profit_percent>{} trades>={}; pairs already in history are skipped.",
        fmt_f64(cfg.scan.min_profit_usd),
        fmt_f64(cfg.scan.min_profit_percent),
        cfg.scan.min_trades_to_save
    );

    let t = &cfg.tags;
    let tags = format!(
        "Tags: Consistent appearances>={} Multi-Winner appearances>={} Whale usd>{} High PnL usd>{} 10x Hunter pnl%>{} Active trades>{} Smart Money appearances>={} and usd>{}.",
        t.consistent_min_appearances,
        t.multi_winner_min_appearances,
        fmt_f64(t.whale_min_pnl_usd),
        fmt_f64(t.high_pnl_min_pnl_usd),
        fmt_f64(t.ten_x_min_pnl_percent),
        t.active_min_trades,
        t.smart_money_min_appearances,
        fmt_f64(t.smart_money_min_pnl_usd)
    );

    [tokens, traders, sightings, tags]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_stage_infos_include_key_numbers() {
        let cfg = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        let infos = scan_stage_infos(&cfg);

        assert!(infos[0].contains("top_gainers(change24 DESC"));
        assert!(infos[0].contains("top_volume(volume24 DESC"));
        assert!(infos[0].contains("tokens_to_scan=10"));
        assert!(infos[1].contains("trading_period=WEEK"));
        assert!(infos[2].contains("profit_percent>5"));
        assert!(infos[3].contains("Whale usd>10000"));
        assert!(infos[3].contains("Smart Money appearances>=2 and usd>500"));
    }

    #[test]
    fn test_fmt_f64_trims_trailing_zeros() {
        assert_eq!(fmt_f64(5.0), "5");
        assert_eq!(fmt_f64(0.2), "0.2");
        assert_eq!(fmt_f64(12.5), "12.5");
    }
}
