use crate::pricing::straddle_usd;
use crate::types::{PricingBasis, Position};
use gex_desk_core::LegQuote;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Mark-to-market of one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub value_usd: Decimal,
    pub pnl_usd: Decimal,
    /// P&L over entry cost, in percent; zero when the entry cost is zero.
    pub pnl_pct: Decimal,
    /// Underlying move since entry, in percent.
    pub move_pct: f64,
    pub spot: f64,
}

impl Valuation {
    #[must_use]
    pub fn pnl_pct_f64(&self) -> f64 {
        self.pnl_pct.to_f64().unwrap_or(0.0)
    }
}

/// Values `position` at mark (mid fallback) with the given leg quotes.
#[must_use]
pub fn value_of(position: &Position, call: &LegQuote, put: &LegQuote, spot: f64) -> Valuation {
    let value_usd = straddle_usd(call, put, spot, position.quantity, PricingBasis::Mark).round_dp(2);
    valuation_from_value(position, value_usd, spot)
}

/// Builds a valuation from an externally computed value.
#[must_use]
pub fn valuation_from_value(position: &Position, value_usd: Decimal, spot: f64) -> Valuation {
    let cost = position.entry_cost();
    let pnl_usd = value_usd - cost;
    let pnl_pct = if cost.is_zero() {
        Decimal::ZERO
    } else {
        (pnl_usd / cost * Decimal::from(100)).round_dp(4)
    };

    Valuation {
        value_usd,
        pnl_usd,
        pnl_pct,
        move_pct: move_pct(position.entry_spot, spot),
        spot,
    }
}

/// Percent change from `entry` to `spot`; zero for a non-positive entry.
#[must_use]
pub fn move_pct(entry: f64, spot: f64) -> f64 {
    if entry > 0.0 && entry.is_finite() && spot.is_finite() {
        (spot - entry) / entry * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryCosts, PositionSource};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position(mark_cost: Decimal, entry_spot: f64) -> Position {
        Position {
            id: "p1".to_string(),
            source: PositionSource::Manual,
            currency: "BTC".to_string(),
            expiry: "28MAR25".to_string(),
            strike: dec!(50000),
            quantity: dec!(0.1),
            opened_at: Utc::now(),
            entry_spot,
            entry_index: None,
            entry_last: None,
            call_instrument: "BTC-28MAR25-50000-C".to_string(),
            put_instrument: "BTC-28MAR25-50000-P".to_string(),
            entry_costs: EntryCosts {
                ask_usd: mark_cost,
                mid_usd: mark_cost,
                mark_usd: mark_cost,
            },
            basis: PricingBasis::Mark,
            close: None,
        }
    }

    fn quote(mark: f64) -> LegQuote {
        LegQuote {
            instrument_name: "x".to_string(),
            bid_price: 0.0,
            ask_price: 0.0,
            mark_price: mark,
            underlying_price: 50_000.0,
        }
    }

    #[test]
    fn values_at_mark() {
        let pos = position(dec!(100), 50_000.0);
        // (0.015 + 0.009) * 51000 * 0.1 = 122.40
        let v = value_of(&pos, &quote(0.015), &quote(0.009), 51_000.0);
        assert_eq!(v.value_usd, dec!(122.40));
        assert_eq!(v.pnl_usd, dec!(22.40));
        assert_eq!(v.pnl_pct, dec!(22.4));
        assert!((v.move_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn zero_cost_has_zero_pct() {
        let pos = position(Decimal::ZERO, 50_000.0);
        let v = valuation_from_value(&pos, dec!(10), 50_000.0);
        assert_eq!(v.pnl_pct, Decimal::ZERO);
    }

    #[test]
    fn move_pct_guards_entry() {
        assert!((move_pct(100.0, 98.5) + 1.5).abs() < 1e-9);
        assert!(move_pct(0.0, 98.5).abs() < f64::EPSILON);
    }
}
