use anyhow::Result;
use common::config::Config;
use common::db::Database;
use rusqlite::OptionalExtension;

use crate::aggregation::WalletAggregate;
use crate::jobs::store::{WalletRow, WALLET_COLUMNS};

const TOP_WALLETS_LIMIT: u32 = 50;
const HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Scan,
    Wallets { tag: Option<String> },
    Wallet { address: String },
    History,
    Settings,
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Ok(Command::Run);
    };

    match cmd.as_str() {
        "run" => Ok(Command::Run),
        "scan" => Ok(Command::Scan),
        "wallets" => {
            // Tag labels contain spaces ("Smart Money"), so join the remainder.
            let rest: Vec<String> = args.collect();
            let tag = (!rest.is_empty()).then(|| rest.join(" "));
            Ok(Command::Wallets { tag })
        }
        "wallet" => {
            let address = args
                .next()
                .ok_or_else(|| "usage: scanner wallet <address>".to_string())?;
            Ok(Command::Wallet { address })
        }
        "history" => Ok(Command::History),
        "settings" => Ok(Command::Settings),
        other => Err(format!("unknown command: {other}")),
    }
}

/// Read-only commands. `Run` and `Scan` need the async runtime and are handled in main.
pub fn run_command(db: &Database, cfg: &Config, cmd: Command) -> Result<()> {
    match cmd {
        Command::Run | Command::Scan => Ok(()),
        Command::Wallets { tag } => show_wallets(db, tag.as_deref()),
        Command::Wallet { address } => show_wallet(db, &address),
        Command::History => show_history(db),
        Command::Settings => {
            show_settings(cfg);
            Ok(())
        }
    }
}

pub fn query_top_wallets(db: &Database, tag: Option<&str>) -> Result<Vec<WalletAggregate>> {
    let sql = format!(
        "SELECT {WALLET_COLUMNS}
         FROM wallets
         WHERE ?1 IS NULL OR EXISTS (SELECT 1 FROM json_each(wallets.tags) WHERE value = ?1)
         ORDER BY CAST(total_pnl_usd AS REAL) DESC
         LIMIT ?2"
    );
    let mut stmt = db.conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params![tag, TOP_WALLETS_LIMIT], WalletRow::from_row)?;
    rows.map(|r| r?.into_aggregate()).collect()
}

pub fn query_wallet(db: &Database, address: &str) -> Result<Option<WalletAggregate>> {
    let row = db
        .conn
        .query_row(
            &format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE wallet_address = ?1"),
            rusqlite::params![address],
            WalletRow::from_row,
        )
        .optional()?;
    row.map(WalletRow::into_aggregate).transpose()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub wallet_address: String,
    pub token_address: String,
    pub token_symbol: String,
    pub pnl_percent: i64,
    pub pnl_usd: String,
    pub trades: i64,
    pub volume_usd: String,
    pub discovered_at: String,
}

/// Most recent discoveries, optionally for one wallet.
pub fn query_history(db: &Database, wallet: Option<&str>) -> Result<Vec<HistoryRow>> {
    let mut stmt = db.conn.prepare(
        "SELECT wallet_address, token_address, token_symbol, pnl_percent, pnl_usd, trades, volume_usd, discovered_at
         FROM wallet_history
         WHERE ?1 IS NULL OR wallet_address = ?1
         ORDER BY discovered_at DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![wallet, HISTORY_LIMIT], |row| {
        Ok(HistoryRow {
            wallet_address: row.get(0)?,
            token_address: row.get(1)?,
            token_symbol: row.get(2)?,
            pnl_percent: row.get(3)?,
            pnl_usd: row.get(4)?,
            trades: row.get(5)?,
            volume_usd: row.get(6)?,
            discovered_at: row.get(7)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

fn tag_list(w: &WalletAggregate) -> String {
    w.tags
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn show_wallets(db: &Database, tag: Option<&str>) -> Result<()> {
    match tag {
        Some(t) => println!("Tracked wallets tagged {t:?}:"),
        None => println!("Tracked wallets:"),
    }
    for w in query_top_wallets(db, tag)? {
        println!(
            "{:>12}  pnl%={:>5}  tokens={:>3}  trades={:>4}  win={}%  [{}]  {}",
            w.total_pnl_usd,
            w.total_pnl,
            w.appearances,
            w.total_trades,
            w.win_rate,
            tag_list(&w),
            w.wallet_address
        );
    }
    Ok(())
}

fn show_wallet(db: &Database, address: &str) -> Result<()> {
    println!("Wallet: {address}");
    let Some(w) = query_wallet(db, address)? else {
        println!("  (not tracked)");
        return Ok(());
    };
    println!(
        "  total_pnl_usd={}  total_pnl={}%  avg_pnl_per_token={}%  avg_return={}%",
        w.total_pnl_usd, w.total_pnl, w.avg_pnl_per_token, w.avg_return
    );
    println!(
        "  appearances={}  winning_tokens={}  total_trades={}  win_rate={}%",
        w.appearances, w.winning_tokens, w.total_trades, w.win_rate
    );
    println!("  tags=[{}]", tag_list(&w));
    println!(
        "  created_at={}  updated_at={}",
        w.created_at.to_rfc3339(),
        w.updated_at.to_rfc3339()
    );

    println!("  discoveries:");
    for h in query_history(db, Some(address))? {
        println!(
            "    {}  {}  pnl={}%  usd={}  trades={}  {}",
            h.discovered_at, h.token_symbol, h.pnl_percent, h.pnl_usd, h.trades, h.token_address
        );
    }
    Ok(())
}

fn show_history(db: &Database) -> Result<()> {
    println!("Recent discoveries:");
    for h in query_history(db, None)? {
        println!(
            "{}  {:<10}  pnl={:>5}%  usd={:>10}  vol={:>10}  {}",
            h.discovered_at, h.token_symbol, h.pnl_percent, h.pnl_usd, h.volume_usd, h.wallet_address
        );
    }
    Ok(())
}

fn show_settings(cfg: &Config) {
    println!("Scan settings:");
    for (stage, info) in ["Tokens", "Traders", "Sightings", "Tags"]
        .iter()
        .zip(common::settings_summary::scan_stage_infos(cfg))
    {
        println!("  {stage:<10} {info}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();
        db
    }

    fn insert_wallet(db: &Database, address: &str, usd: &str, tags: &str) {
        db.conn
            .execute(
                &format!(
                    "INSERT INTO wallets ({WALLET_COLUMNS}) VALUES
                     (?1, 120, ?2, 120, 1, 5, 1, 120, 55, ?3,
                      '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')"
                ),
                rusqlite::params![address, usd, tags],
            )
            .unwrap();
    }

    #[test]
    fn test_top_wallets_sorted_by_usd_and_filtered_by_tag() {
        let db = db();
        insert_wallet(&db, "W_SMALL", "900.00", r#"["Tracked"]"#);
        insert_wallet(&db, "W_BIG", "15000.00", r#"["Whale","Smart Money"]"#);
        insert_wallet(&db, "W_MID", "6000.00", r#"["High PnL"]"#);

        let all = query_top_wallets(&db, None).unwrap();
        let order: Vec<&str> = all.iter().map(|w| w.wallet_address.as_str()).collect();
        assert_eq!(order, vec!["W_BIG", "W_MID", "W_SMALL"]);

        let smart = query_top_wallets(&db, Some("Smart Money")).unwrap();
        assert_eq!(smart.len(), 1);
        assert_eq!(smart[0].wallet_address, "W_BIG");
    }

    #[test]
    fn test_query_wallet_and_history() {
        let db = db();
        insert_wallet(&db, "W1", "6000.00", r#"["High PnL"]"#);
        db.conn
            .execute(
                "INSERT INTO wallet_history
                 (wallet_address, token_address, token_symbol, pnl_percent, pnl_usd, trades, volume_usd, discovered_at)
                 VALUES ('W1', 'T1', 'AAA', 120, '6000.00', 5, '9000.00', '2026-01-01T00:00:00.000Z')",
                [],
            )
            .unwrap();

        let w = query_wallet(&db, "W1").unwrap().unwrap();
        assert_eq!(w.win_rate, 55);
        assert!(query_wallet(&db, "nobody").unwrap().is_none());

        let history = query_history(&db, Some("W1")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].token_symbol, "AAA");
        assert!(query_history(&db, Some("nobody")).unwrap().is_empty());
        assert_eq!(query_history(&db, None).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_args_defaults_to_run() {
        let cmd = parse_args(vec!["scanner".to_string()].into_iter()).unwrap();
        assert_eq!(cmd, Command::Run);
    }

    #[test]
    fn test_parse_wallets_tag_with_spaces() {
        let args = ["scanner", "wallets", "Smart", "Money"].map(String::from);
        assert_eq!(
            parse_args(args.into_iter()).unwrap(),
            Command::Wallets {
                tag: Some("Smart Money".to_string())
            }
        );
        let args = ["scanner", "wallets"].map(String::from);
        assert_eq!(
            parse_args(args.into_iter()).unwrap(),
            Command::Wallets { tag: None }
        );
    }

    #[test]
    fn test_parse_wallet_command() {
        let args = ["scanner", "wallet", "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU"].map(String::from);
        assert_eq!(
            parse_args(args.into_iter()).unwrap(),
            Command::Wallet {
                address: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string()
            }
        );
        let args = ["scanner", "wallet"].map(String::from);
        assert!(parse_args(args.into_iter()).is_err());
        let args = ["scanner", "bogus"].map(String::from);
        assert!(parse_args(args.into_iter()).is_err());
    }
}
