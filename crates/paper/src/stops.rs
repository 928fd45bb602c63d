//! Exit rules for open straddles.

use crate::targets::check_take_profit;
use crate::types::{CloseReason, ExitSignal, Position};
use crate::valuation::Valuation;

/// Thresholds for the exit rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitRules {
    /// Stop out when P&L percent is at or below this value (e.g. -60).
    pub sl_pnl_pct: f64,
    /// Take profit when the absolute underlying move reaches this percent.
    pub tp_move_pct: f64,
}

/// Check all exit rules against a valued position. Stop-loss wins over
/// take-profit, so a position gets at most one reason per evaluation.
pub fn check_exit_rules(pos: &Position, valuation: &Valuation, rules: &ExitRules) -> Option<ExitSignal> {
    if let Some(signal) = check_stop_loss(pos, valuation, rules.sl_pnl_pct) {
        return Some(signal);
    }

    check_take_profit(pos, valuation, rules.tp_move_pct)
}

/// Close if P&L percent has fallen to `sl_pnl_pct` or below.
pub fn check_stop_loss(pos: &Position, valuation: &Valuation, sl_pnl_pct: f64) -> Option<ExitSignal> {
    let pnl_pct = valuation.pnl_pct_f64();
    if pnl_pct <= sl_pnl_pct {
        tracing::warn!(
            id = %pos.id,
            key = %pos.key(),
            pnl_pct = %valuation.pnl_pct,
            threshold = sl_pnl_pct,
            "Stop-loss triggered"
        );
        return Some(ExitSignal::Close {
            reason: CloseReason::StopLoss,
        });
    }
    None
}
