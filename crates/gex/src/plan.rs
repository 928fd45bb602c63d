//! Simple level-based trade plan: fade walls in gamma-positive regimes,
//! trade breakouts otherwise.

use crate::levels::Regime;
use serde::{Deserialize, Serialize};

/// Stop distance beyond the level for a fade.
const FADE_STOP_FRACTION: f64 = 0.0015;
/// Stop distance back through the level for a breakout.
const BREAKOUT_STOP_FRACTION: f64 = 0.001;
/// Default breakout target when no further wall exists.
const BREAKOUT_FALLBACK_TARGET: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Setup {
    Fade,
    Breakout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    BuyBounce,
    SellReject,
    BuyBreak,
    SellBreak,
}

impl std::fmt::Display for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fade => write!(f, "FADE"),
            Self::Breakout => write!(f, "BREAKOUT"),
        }
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuyBounce => write!(f, "BUY bounce"),
            Self::SellReject => write!(f, "SELL reject"),
            Self::BuyBreak => write!(f, "BUY break"),
            Self::SellBreak => write!(f, "SELL break"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub setup: Setup,
    pub bias: Bias,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    /// Reward over risk; zero when the stop sits on the entry.
    pub rr: f64,
}

/// Builds a plan around `level`. `below`/`above` are the nearest walls
/// bracketing spot. Returns `None` for a non-positive level.
#[must_use]
pub fn plan_from_level(
    spot: f64,
    regime: Regime,
    level: f64,
    below: Option<f64>,
    above: Option<f64>,
) -> Option<Plan> {
    if level.is_nan() || level <= 0.0 {
        return None;
    }

    let is_support = level < spot;
    let entry = level;

    let (setup, bias, stop, target) = if regime == Regime::GammaPositive {
        let bias = if is_support { Bias::BuyBounce } else { Bias::SellReject };
        let stop = if is_support {
            level * (1.0 - FADE_STOP_FRACTION)
        } else {
            level * (1.0 + FADE_STOP_FRACTION)
        };
        let target = if is_support {
            above.map_or(spot, |a| a.min(spot))
        } else {
            below.map_or(spot, |b| b.max(spot))
        };
        (Setup::Fade, bias, stop, target)
    } else {
        let bias = if is_support { Bias::SellBreak } else { Bias::BuyBreak };
        let stop = if is_support {
            level * (1.0 + BREAKOUT_STOP_FRACTION)
        } else {
            level * (1.0 - BREAKOUT_STOP_FRACTION)
        };
        let target = if is_support {
            below
                .filter(|b| *b < level)
                .unwrap_or(level * (1.0 - BREAKOUT_FALLBACK_TARGET))
        } else {
            above
                .filter(|a| *a > level)
                .unwrap_or(level * (1.0 + BREAKOUT_FALLBACK_TARGET))
        };
        (Setup::Breakout, bias, stop, target)
    };

    let risk = (entry - stop).abs();
    let reward = (target - entry).abs();
    let rr = if risk > 0.0 { reward / risk } else { 0.0 };

    Some(Plan {
        setup,
        bias,
        entry,
        stop,
        target,
        rr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn fade_support_in_gamma_positive() {
        let plan = plan_from_level(61_000.0, Regime::GammaPositive, 60_000.0, Some(60_000.0), Some(62_000.0)).unwrap();
        assert_eq!(plan.setup, Setup::Fade);
        assert_eq!(plan.bias, Bias::BuyBounce);
        assert!(close(plan.stop, 59_910.0));
        assert!(close(plan.target, 61_000.0));
        assert!(close(plan.rr, 1000.0 / 90.0));
    }

    #[test]
    fn fade_resistance_targets_back_to_spot() {
        let plan = plan_from_level(61_000.0, Regime::GammaPositive, 62_000.0, Some(60_000.0), Some(62_000.0)).unwrap();
        assert_eq!(plan.bias, Bias::SellReject);
        assert!(close(plan.stop, 62_093.0));
        assert!(close(plan.target, 61_000.0));
    }

    #[test]
    fn breakout_above_uses_fallback_target() {
        let plan = plan_from_level(61_000.0, Regime::GammaNegative, 62_000.0, None, Some(62_000.0)).unwrap();
        assert_eq!(plan.setup, Setup::Breakout);
        assert_eq!(plan.bias, Bias::BuyBreak);
        assert!(close(plan.stop, 61_938.0));
        assert!(close(plan.target, 62_620.0));
        assert!(close(plan.rr, 10.0));
    }

    #[test]
    fn breakout_below_targets_lower_wall() {
        let plan = plan_from_level(61_000.0, Regime::Neutral, 60_000.0, Some(58_000.0), None).unwrap();
        assert_eq!(plan.bias, Bias::SellBreak);
        assert!(close(plan.target, 58_000.0));
    }

    #[test]
    fn rejects_non_positive_level() {
        assert!(plan_from_level(61_000.0, Regime::GammaPositive, 0.0, None, None).is_none());
        assert!(plan_from_level(61_000.0, Regime::GammaPositive, f64::NAN, None, None).is_none());
    }
}
