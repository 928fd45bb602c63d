//! Types for paper straddle positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Who opened a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    Manual,
    Bot,
}

impl std::fmt::Display for PositionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Bot => write!(f, "bot"),
        }
    }
}

/// Reason for closing a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    Manual,
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::StopLoss => write!(f, "stop-loss"),
            Self::TakeProfit => write!(f, "take-profit"),
        }
    }
}

/// Which leg price an entry cost is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingBasis {
    Ask,
    Mid,
    #[default]
    Mark,
}

/// Straddle entry cost in USD under each pricing convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryCosts {
    pub ask_usd: Decimal,
    pub mid_usd: Decimal,
    pub mark_usd: Decimal,
}

impl EntryCosts {
    #[must_use]
    pub const fn for_basis(&self, basis: PricingBasis) -> Decimal {
        match basis {
            PricingBasis::Ask => self.ask_usd,
            PricingBasis::Mid => self.mid_usd,
            PricingBasis::Mark => self.mark_usd,
        }
    }
}

/// Uniqueness key for open positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub currency: String,
    pub expiry: String,
    pub strike: Decimal,
}

impl MarketKey {
    pub fn new(currency: &str, expiry: &str, strike: Decimal) -> Self {
        Self {
            currency: currency.trim().to_ascii_uppercase(),
            expiry: expiry.trim().to_ascii_uppercase(),
            strike: strike.normalize(),
        }
    }
}

impl std::fmt::Display for MarketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.currency, self.expiry, self.strike)
    }
}

/// Fields stamped when a position closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseInfo {
    pub closed_at: DateTime<Utc>,
    pub reason: CloseReason,
    pub exit_spot: f64,
    pub exit_value_usd: Decimal,
    pub pnl_usd: Decimal,
    pub pnl_pct: Decimal,
}

/// A paper long straddle: one call and one put at the same strike and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub source: PositionSource,
    pub currency: String,
    pub expiry: String,
    pub strike: Decimal,
    /// Contracts per leg.
    pub quantity: Decimal,
    pub opened_at: DateTime<Utc>,
    pub entry_spot: f64,
    #[serde(default)]
    pub entry_index: Option<f64>,
    #[serde(default)]
    pub entry_last: Option<f64>,
    pub call_instrument: String,
    pub put_instrument: String,
    pub entry_costs: EntryCosts,
    pub basis: PricingBasis,
    #[serde(default)]
    pub close: Option<CloseInfo>,
}

impl Position {
    #[must_use]
    pub fn key(&self) -> MarketKey {
        MarketKey::new(&self.currency, &self.expiry, self.strike)
    }

    /// Entry cost under the position's own pricing basis.
    #[must_use]
    pub const fn entry_cost(&self) -> Decimal {
        self.entry_costs.for_basis(self.basis)
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.close.is_none()
    }
}

/// Everything needed to open a position; the ledger assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub source: PositionSource,
    pub currency: String,
    pub expiry: String,
    pub strike: Decimal,
    pub quantity: Decimal,
    pub entry_spot: f64,
    #[serde(default)]
    pub entry_index: Option<f64>,
    #[serde(default)]
    pub entry_last: Option<f64>,
    pub call_instrument: String,
    pub put_instrument: String,
    pub entry_costs: EntryCosts,
    #[serde(default)]
    pub basis: PricingBasis,
}

impl OpenRequest {
    #[must_use]
    pub fn key(&self) -> MarketKey {
        MarketKey::new(&self.currency, &self.expiry, self.strike)
    }
}

/// Exit observation applied by [`PositionLedger::close`](crate::PositionLedger::close).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitFill {
    pub reason: CloseReason,
    pub exit_spot: f64,
    pub exit_value_usd: Decimal,
}

/// Action produced by the exit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    Close { reason: CloseReason },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_key_normalises_case_and_scale() {
        let a = MarketKey::new("btc", "28mar25", dec!(70000.00));
        let b = MarketKey::new("BTC", "28MAR25", dec!(70000));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "BTC-28MAR25-70000");
    }

    #[test]
    fn close_reason_wire_names() {
        assert_eq!(serde_json::to_string(&CloseReason::StopLoss).unwrap(), "\"stop-loss\"");
        assert_eq!(CloseReason::TakeProfit.to_string(), "take-profit");
    }

    #[test]
    fn entry_cost_follows_basis() {
        let costs = EntryCosts {
            ask_usd: dec!(120),
            mid_usd: dec!(110),
            mark_usd: dec!(105),
        };
        assert_eq!(costs.for_basis(PricingBasis::Ask), dec!(120));
        assert_eq!(costs.for_basis(PricingBasis::Mark), dec!(105));
        assert_eq!(PricingBasis::default(), PricingBasis::Mark);
    }
}
