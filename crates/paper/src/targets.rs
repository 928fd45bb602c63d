//! Take-profit rule: the straddle pays once the underlying has moved far enough.

use crate::types::{CloseReason, ExitSignal, Position};
use crate::valuation::Valuation;

/// Close once `|move since entry| >= tp_move_pct`, in either direction.
pub fn check_take_profit(pos: &Position, valuation: &Valuation, tp_move_pct: f64) -> Option<ExitSignal> {
    if tp_move_pct <= 0.0 {
        return None;
    }

    let moved = valuation.move_pct.abs();
    if moved >= tp_move_pct {
        tracing::info!(
            id = %pos.id,
            key = %pos.key(),
            move_pct = valuation.move_pct,
            pnl_pct = %valuation.pnl_pct,
            "Take-profit hit"
        );
        return Some(ExitSignal::Close {
            reason: CloseReason::TakeProfit,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryCosts, PricingBasis, PositionSource};
    use crate::valuation::valuation_from_value;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn make_position(entry_spot: f64) -> Position {
        Position {
            id: "tp-1".to_string(),
            source: PositionSource::Bot,
            currency: "BTC".to_string(),
            expiry: "28MAR25".to_string(),
            strike: dec!(60000),
            quantity: dec!(0.1),
            opened_at: Utc::now(),
            entry_spot,
            entry_index: None,
            entry_last: Some(entry_spot),
            call_instrument: "BTC-28MAR25-60000-C".to_string(),
            put_instrument: "BTC-28MAR25-60000-P".to_string(),
            entry_costs: EntryCosts {
                ask_usd: dec!(200),
                mid_usd: dec!(190),
                mark_usd: dec!(185),
            },
            basis: PricingBasis::Ask,
            close: None,
        }
    }

    #[test]
    fn triggers_on_move_up_and_down() {
        let pos = make_position(60_000.0);
        let up = valuation_from_value(&pos, dec!(210), 61_000.0);
        let down = valuation_from_value(&pos, dec!(210), 59_000.0);
        assert_eq!(check_take_profit(&pos, &up, 1.5), Some(ExitSignal::Close { reason: CloseReason::TakeProfit }));
        assert_eq!(check_take_profit(&pos, &down, 1.5), Some(ExitSignal::Close { reason: CloseReason::TakeProfit }));
    }

    #[test]
    fn quiet_market_holds() {
        let pos = make_position(60_000.0);
        let v = valuation_from_value(&pos, dec!(190), 60_600.0);
        assert!(check_take_profit(&pos, &v, 1.5).is_none());
    }

    #[test]
    fn non_positive_threshold_disables_rule() {
        let pos = make_position(60_000.0);
        let v = valuation_from_value(&pos, dec!(190), 70_000.0);
        assert!(check_take_profit(&pos, &v, 0.0).is_none());
    }
}
