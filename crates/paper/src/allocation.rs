//! Risk gate for new entries.
//!
//! Caps the number of open straddles and the total premium at risk.

use rust_decimal::Decimal;

use crate::types::{MarketKey, Position};

/// Limits applied before opening a new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskLimits {
    pub max_positions: usize,
    pub max_risk_usd: Decimal,
}

/// Result of a risk check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskCheck {
    Approved {
        remaining_usd: Decimal,
    },
    MaxPositions {
        open: usize,
        max: usize,
    },
    /// Open premium is already at or above the cap.
    MaxRisk {
        open_risk_usd: Decimal,
        max_risk_usd: Decimal,
    },
    /// The candidate would push open premium over the cap.
    WouldExceed {
        open_risk_usd: Decimal,
        candidate_usd: Decimal,
        max_risk_usd: Decimal,
    },
    Duplicate {
        key: MarketKey,
    },
}

impl RiskCheck {
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Sum of entry costs across open positions.
#[must_use]
pub fn open_risk_usd(open: &[Position]) -> Decimal {
    open.iter().map(Position::entry_cost).sum()
}

/// Check a candidate entry costing `candidate_usd` at `key` against `limits`.
pub fn check_risk(open: &[Position], key: &MarketKey, candidate_usd: Decimal, limits: &RiskLimits) -> RiskCheck {
    if open.len() >= limits.max_positions {
        return RiskCheck::MaxPositions {
            open: open.len(),
            max: limits.max_positions,
        };
    }

    let open_risk = open_risk_usd(open);
    if open_risk >= limits.max_risk_usd {
        return RiskCheck::MaxRisk {
            open_risk_usd: open_risk,
            max_risk_usd: limits.max_risk_usd,
        };
    }

    let after_trade = open_risk + candidate_usd;
    if after_trade > limits.max_risk_usd {
        return RiskCheck::WouldExceed {
            open_risk_usd: open_risk,
            candidate_usd,
            max_risk_usd: limits.max_risk_usd,
        };
    }

    if open.iter().any(|p| &p.key() == key) {
        return RiskCheck::Duplicate { key: key.clone() };
    }

    RiskCheck::Approved {
        remaining_usd: limits.max_risk_usd - after_trade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryCosts, PricingBasis, PositionSource};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn open_position(strike: Decimal, cost: Decimal) -> Position {
        Position {
            id: format!("p-{strike}"),
            source: PositionSource::Bot,
            currency: "BTC".to_string(),
            expiry: "28MAR25".to_string(),
            strike,
            quantity: dec!(0.1),
            opened_at: Utc::now(),
            entry_spot: 70_000.0,
            entry_index: None,
            entry_last: None,
            call_instrument: format!("BTC-28MAR25-{strike}-C"),
            put_instrument: format!("BTC-28MAR25-{strike}-P"),
            entry_costs: EntryCosts {
                ask_usd: cost,
                mid_usd: cost,
                mark_usd: cost,
            },
            basis: PricingBasis::Ask,
            close: None,
        }
    }

    fn limits() -> RiskLimits {
        RiskLimits {
            max_positions: 3,
            max_risk_usd: dec!(500),
        }
    }

    fn key(strike: Decimal) -> MarketKey {
        MarketKey::new("BTC", "28MAR25", strike)
    }

    #[test]
    fn approves_within_limits() {
        let open = vec![open_position(dec!(70000), dec!(200))];
        let result = check_risk(&open, &key(dec!(71000)), dec!(150), &limits());
        assert_eq!(result, RiskCheck::Approved { remaining_usd: dec!(150) });
    }

    #[test]
    fn rejects_at_position_cap() {
        let open = vec![
            open_position(dec!(70000), dec!(10)),
            open_position(dec!(71000), dec!(10)),
            open_position(dec!(72000), dec!(10)),
        ];
        let result = check_risk(&open, &key(dec!(73000)), dec!(10), &limits());
        assert!(matches!(result, RiskCheck::MaxPositions { open: 3, max: 3 }));
    }

    #[test]
    fn rejects_when_cap_already_used() {
        let open = vec![open_position(dec!(70000), dec!(500))];
        let result = check_risk(&open, &key(dec!(71000)), dec!(1), &limits());
        assert!(matches!(result, RiskCheck::MaxRisk { .. }));
    }

    #[test]
    fn rejects_when_candidate_would_exceed() {
        let open = vec![open_position(dec!(70000), dec!(400))];
        let result = check_risk(&open, &key(dec!(71000)), dec!(101), &limits());
        assert!(matches!(result, RiskCheck::WouldExceed { .. }));

        let exact = check_risk(&open, &key(dec!(71000)), dec!(100), &limits());
        assert!(exact.is_approved());
    }

    #[test]
    fn rejects_duplicate_key() {
        let open = vec![open_position(dec!(70000), dec!(100))];
        let result = check_risk(&open, &key(dec!(70000)), dec!(100), &limits());
        assert!(matches!(result, RiskCheck::Duplicate { .. }));
    }
}
