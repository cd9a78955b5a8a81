use common::config::Tags;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Category label derived from a wallet's running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletTag {
    Consistent,
    MultiWinner,
    Whale,
    HighPnl,
    TenXHunter,
    Active,
    SmartMoney,
    Tracked,
}

impl WalletTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consistent => "Consistent",
            Self::MultiWinner => "Multi-Winner",
            Self::Whale => "Whale",
            Self::HighPnl => "High PnL",
            Self::TenXHunter => "10x Hunter",
            Self::Active => "Active",
            Self::SmartMoney => "Smart Money",
            Self::Tracked => "Tracked",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "Consistent" => Some(Self::Consistent),
            "Multi-Winner" => Some(Self::MultiWinner),
            "Whale" => Some(Self::Whale),
            "High PnL" => Some(Self::HighPnl),
            "10x Hunter" => Some(Self::TenXHunter),
            "Active" => Some(Self::Active),
            "Smart Money" => Some(Self::SmartMoney),
            "Tracked" => Some(Self::Tracked),
            _ => None,
        }
    }
}

/// Counters the tag rules read. `total_pnl_percent` is the unrounded running sum.
#[derive(Debug, Clone, Copy)]
pub struct TagInput {
    pub appearances: u32,
    pub total_pnl_usd: Decimal,
    pub total_pnl_percent: f64,
    pub total_trades: u32,
}

/// Evaluate every rule independently and return labels in fixed output order.
/// Whale and High PnL are mutually exclusive; "Tracked" appears only when nothing else fired.
pub fn derive_tags(input: &TagInput, t: &Tags) -> Vec<WalletTag> {
    let usd = input.total_pnl_usd.to_f64().unwrap_or(0.0);
    let mut tags = Vec::with_capacity(4);

    if input.appearances >= t.consistent_min_appearances {
        tags.push(WalletTag::Consistent);
    }
    if input.appearances >= t.multi_winner_min_appearances {
        tags.push(WalletTag::MultiWinner);
    }
    if usd > t.whale_min_pnl_usd {
        tags.push(WalletTag::Whale);
    } else if usd > t.high_pnl_min_pnl_usd {
        tags.push(WalletTag::HighPnl);
    }
    if input.total_pnl_percent > t.ten_x_min_pnl_percent {
        tags.push(WalletTag::TenXHunter);
    }
    if input.total_trades > t.active_min_trades {
        tags.push(WalletTag::Active);
    }
    if input.appearances >= t.smart_money_min_appearances && usd > t.smart_money_min_pnl_usd {
        tags.push(WalletTag::SmartMoney);
    }

    if tags.is_empty() {
        tags.push(WalletTag::Tracked);
    }
    tags
}
