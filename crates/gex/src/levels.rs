//! Gamma flip, wall ranking and regime classification.

use crate::exposure::StrikeAggregate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A strike with outsized aggregate exposure. `rank` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub strike: Decimal,
    pub net_gex: f64,
    pub rank: usize,
}

impl Wall {
    #[must_use]
    pub fn strike_f64(&self) -> f64 {
        self.strike.to_f64().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Dealers long gamma in aggregate; moves tend to mean-revert.
    GammaPositive,
    /// Dealers short gamma in aggregate; moves tend to extend.
    GammaNegative,
    Neutral,
}

impl Regime {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::GammaPositive => "GAMMA+ (mean-revert)",
            Self::GammaNegative => "GAMMA- (directional)",
            Self::Neutral => "NEUTRAL",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// First strike, walking ascending, where the net profile changes sign or
/// lands on zero coming from a non-zero value.
///
/// This reads the per-strike values, not a cumulative sum from the lowest
/// strike: `{100: 5, 110: 3, 120: -4, 130: -2}` flips at 120 although its
/// running sum (5, 8, 4, 2) never crosses zero.
///
/// A profile that starts at zero and never leaves one side has no flip.
#[must_use]
pub fn gamma_flip(aggregate: &StrikeAggregate) -> Option<Decimal> {
    let mut prev: Option<f64> = None;
    for (strike, &value) in aggregate {
        if let Some(p) = prev {
            if (p < 0.0 && value >= 0.0) || (p > 0.0 && value <= 0.0) {
                return Some(*strike);
            }
        }
        prev = Some(value);
    }
    None
}

/// Top `n` strikes by absolute net exposure; ties go to the lower strike.
#[must_use]
pub fn top_walls(aggregate: &StrikeAggregate, n: usize) -> Vec<Wall> {
    let mut items: Vec<(Decimal, f64)> = aggregate.iter().map(|(k, v)| (*k, *v)).collect();
    items.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    items
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, (strike, net_gex))| Wall {
            strike,
            net_gex,
            rank: i + 1,
        })
        .collect()
}

#[must_use]
pub fn regime(aggregate: &StrikeAggregate) -> Regime {
    let total: f64 = aggregate.values().sum();
    if total > 0.0 {
        Regime::GammaPositive
    } else if total < 0.0 {
        Regime::GammaNegative
    } else {
        Regime::Neutral
    }
}

/// Closest wall at or below spot and closest wall at or above spot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NearestLevels {
    pub below: Option<Wall>,
    pub above: Option<Wall>,
}

impl NearestLevels {
    /// The nearer of the two, preferring `below` at equal distance.
    #[must_use]
    pub fn closest(&self, spot: f64) -> Option<Wall> {
        match (self.below, self.above) {
            (Some(b), Some(a)) => {
                if (spot - b.strike_f64()).abs() <= (a.strike_f64() - spot).abs() {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }
}

#[must_use]
pub fn nearest_levels(spot: f64, walls: &[Wall]) -> NearestLevels {
    let mut levels = NearestLevels::default();
    for wall in walls {
        let k = wall.strike_f64();
        if k <= spot && levels.below.map_or(true, |b| k > b.strike_f64()) {
            levels.below = Some(*wall);
        }
        if k >= spot && levels.above.map_or(true, |a| k < a.strike_f64()) {
            levels.above = Some(*wall);
        }
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn agg(pairs: &[(Decimal, f64)]) -> StrikeAggregate {
        pairs.iter().copied().collect()
    }

    #[test]
    fn flip_at_first_sign_change() {
        let a = agg(&[(dec!(100), 5.0), (dec!(110), 3.0), (dec!(120), -4.0), (dec!(130), -2.0)]);
        assert_eq!(gamma_flip(&a), Some(dec!(120)));

        // running sum stays positive throughout
        let running: Vec<f64> = a
            .values()
            .scan(0.0, |acc, v| {
                *acc += v;
                Some(*acc)
            })
            .collect();
        assert!(running.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn no_flip_when_one_sided() {
        let a = agg(&[(dec!(100), 1.0), (dec!(110), 1.0)]);
        assert_eq!(gamma_flip(&a), None);
        assert_eq!(gamma_flip(&StrikeAggregate::new()), None);
    }

    #[test]
    fn flip_on_negative_to_positive_and_on_zero_touch() {
        let up = agg(&[(dec!(100), -3.0), (dec!(110), -1.0), (dec!(120), 2.0)]);
        assert_eq!(gamma_flip(&up), Some(dec!(120)));

        let touch = agg(&[(dec!(100), -3.0), (dec!(110), 0.0), (dec!(120), -2.0)]);
        assert_eq!(gamma_flip(&touch), Some(dec!(110)));

        let flat = agg(&[(dec!(100), 0.0), (dec!(110), 0.0)]);
        assert_eq!(gamma_flip(&flat), None);
    }

    #[test]
    fn walls_ranked_by_magnitude() {
        let a = agg(&[(dec!(100), 5.0), (dec!(110), -40.0), (dec!(120), 2.0)]);
        let walls = top_walls(&a, 2);
        assert_eq!(walls.len(), 2);
        assert_eq!((walls[0].strike, walls[0].net_gex, walls[0].rank), (dec!(110), -40.0, 1));
        assert_eq!((walls[1].strike, walls[1].net_gex, walls[1].rank), (dec!(100), 5.0, 2));
    }

    #[test]
    fn wall_ties_break_on_lower_strike() {
        let a = agg(&[(dec!(130), -7.0), (dec!(100), 7.0), (dec!(110), 1.0)]);
        let walls = top_walls(&a, 5);
        assert_eq!(walls.iter().map(|w| w.strike).collect::<Vec<_>>(), vec![dec!(100), dec!(130), dec!(110)]);
        assert!(top_walls(&a, 0).is_empty());
    }

    #[test]
    fn regime_from_total() {
        assert_eq!(regime(&agg(&[(dec!(1), 2.0), (dec!(2), -1.0)])), Regime::GammaPositive);
        assert_eq!(regime(&agg(&[(dec!(1), -2.0), (dec!(2), 1.0)])), Regime::GammaNegative);
        assert_eq!(regime(&StrikeAggregate::new()), Regime::Neutral);
        assert_eq!(Regime::GammaPositive.to_string(), "GAMMA+ (mean-revert)");
    }

    #[test]
    fn nearest_levels_bracket_spot() {
        let a = agg(&[(dec!(60000), 9.0), (dec!(62000), -4.0), (dec!(65000), 3.0), (dec!(58000), 1.0)]);
        let walls = top_walls(&a, 10);
        let levels = nearest_levels(61_000.0, &walls);
        assert_eq!(levels.below.map(|w| w.strike), Some(dec!(60000)));
        assert_eq!(levels.above.map(|w| w.strike), Some(dec!(62000)));
        assert_eq!(levels.closest(61_000.0).map(|w| w.strike), Some(dec!(60000)));
        assert_eq!(levels.closest(61_600.0).map(|w| w.strike), Some(dec!(62000)));

        let outside = nearest_levels(70_000.0, &walls);
        assert_eq!(outside.below.map(|w| w.strike), Some(dec!(65000)));
        assert!(outside.above.is_none());
    }
}
