//! Per-instrument dealer gamma exposure and its aggregation by strike.

use gex_desk_core::OptionQuoteRow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Net signed exposure per strike, ascending by strike.
pub type StrikeAggregate = BTreeMap<Decimal, f64>;

/// An option row with its signed gamma exposure attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GammaExposureRow {
    #[serde(flatten)]
    pub quote: OptionQuoteRow,
    pub gex: f64,
}

/// Signed exposure for one row: `sign * gamma * oi * spot^2 * scale`.
#[must_use]
pub fn row_exposure(row: &OptionQuoteRow, scale: f64) -> f64 {
    let spot = row.underlying_price;
    row.option_type.gex_sign() * row.gamma * row.open_interest * spot * spot * scale
}

/// Computes exposure for every row.
///
/// Rows whose exposure is not finite or whose strike is not positive are
/// dropped; they would poison every sum they touch.
#[must_use]
pub fn compute_gex_rows(rows: &[OptionQuoteRow], scale: f64) -> Vec<GammaExposureRow> {
    let mut out = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for row in rows {
        let gex = row_exposure(row, scale);
        if !gex.is_finite() || row.strike <= Decimal::ZERO {
            dropped += 1;
            continue;
        }
        out.push(GammaExposureRow {
            quote: row.clone(),
            gex,
        });
    }

    if dropped > 0 {
        tracing::debug!(dropped, kept = out.len(), "Dropped malformed option rows");
    }
    out
}

/// Sums exposure per strike.
///
/// Contributions at each strike are summed in a canonical order, so the
/// result is bit-identical under any permutation of `rows`.
#[must_use]
pub fn aggregate_by_strike(rows: &[GammaExposureRow]) -> StrikeAggregate {
    let mut buckets: BTreeMap<Decimal, Vec<f64>> = BTreeMap::new();
    for row in rows {
        buckets.entry(row.quote.strike).or_default().push(row.gex);
    }
    buckets
        .into_iter()
        .map(|(strike, values)| (strike, canonical_sum(values)))
        .collect()
}

/// Sums several aggregates strike by strike.
#[must_use]
pub fn merge_aggregates<'a, I>(aggregates: I) -> StrikeAggregate
where
    I: IntoIterator<Item = &'a StrikeAggregate>,
{
    let mut buckets: BTreeMap<Decimal, Vec<f64>> = BTreeMap::new();
    for aggregate in aggregates {
        for (strike, value) in aggregate {
            buckets.entry(*strike).or_default().push(*value);
        }
    }
    buckets
        .into_iter()
        .map(|(strike, values)| (strike, canonical_sum(values)))
        .collect()
}

fn canonical_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gex_desk_core::OptionType;
    use rust_decimal_macros::dec;

    fn row(strike: Decimal, option_type: OptionType, gamma: f64, oi: f64, spot: f64) -> OptionQuoteRow {
        OptionQuoteRow {
            instrument_name: format!("BTC-28MAR25-{strike}-{}", if option_type == OptionType::Call { "C" } else { "P" }),
            strike,
            option_type,
            open_interest: oi,
            gamma,
            bid_price: 0.01,
            ask_price: 0.012,
            mark_price: 0.011,
            mark_iv: 55.0,
            underlying_price: spot,
            expiry: "28MAR25".to_string(),
        }
    }

    #[test]
    fn call_sign_convention() {
        let call = row(dec!(50000), OptionType::Call, 2e-6, 100.0, 50_000.0);
        let unscaled = row_exposure(&call, 1.0);
        assert!((unscaled - 500_000.0).abs() < 1e-6);

        let scaled = compute_gex_rows(&[call], 1e-6);
        assert!((scaled[0].gex - 0.5).abs() < 1e-12);
    }

    #[test]
    fn put_is_negated_call() {
        let call = row(dec!(50000), OptionType::Call, 2e-6, 100.0, 50_000.0);
        let put = row(dec!(50000), OptionType::Put, 2e-6, 100.0, 50_000.0);
        assert!((row_exposure(&call, 1.0) + row_exposure(&put, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn unknown_type_uses_put_sign() {
        let other = row(dec!(50000), OptionType::Other, 2e-6, 100.0, 50_000.0);
        assert!(row_exposure(&other, 1.0) < 0.0);
    }

    #[test]
    fn zero_open_interest_contributes_nothing() {
        let rows = compute_gex_rows(&[row(dec!(60000), OptionType::Call, 1e-5, 0.0, 60_000.0)], 1e-6);
        let agg = aggregate_by_strike(&rows);
        assert_eq!(agg.get(&dec!(60000)), Some(&0.0));
    }

    #[test]
    fn drops_non_finite_and_non_positive_strikes() {
        let rows = vec![
            row(dec!(60000), OptionType::Call, f64::NAN, 10.0, 60_000.0),
            row(dec!(0), OptionType::Call, 1e-5, 10.0, 60_000.0),
            row(dec!(61000), OptionType::Put, 1e-5, 10.0, 60_000.0),
        ];
        let out = compute_gex_rows(&rows, 1e-6);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].quote.strike, dec!(61000));
    }

    #[test]
    fn aggregation_is_permutation_invariant() {
        let rows = vec![
            row(dec!(60000), OptionType::Call, 1.3e-5, 120.5, 61_234.5),
            row(dec!(60000), OptionType::Put, 1.1e-5, 98.25, 61_234.5),
            row(dec!(62000), OptionType::Call, 0.7e-5, 310.0, 61_234.5),
            row(dec!(60000), OptionType::Call, 0.3e-5, 77.1, 61_234.5),
            row(dec!(58000), OptionType::Put, 2.9e-5, 14.0, 61_234.5),
        ];
        let forward = aggregate_by_strike(&compute_gex_rows(&rows, 1e-6));

        let mut reversed = rows.clone();
        reversed.reverse();
        let backward = aggregate_by_strike(&compute_gex_rows(&reversed, 1e-6));

        let mut rotated = rows;
        rotated.rotate_left(2);
        let rotated = aggregate_by_strike(&compute_gex_rows(&rotated, 1e-6));

        assert_eq!(forward, backward);
        assert_eq!(forward, rotated);
        assert_eq!(forward.keys().copied().collect::<Vec<_>>(), vec![dec!(58000), dec!(60000), dec!(62000)]);
    }

    #[test]
    fn scale_does_not_change_ordering() {
        let rows = vec![
            row(dec!(60000), OptionType::Call, 1e-5, 100.0, 60_000.0),
            row(dec!(61000), OptionType::Put, 3e-5, 100.0, 60_000.0),
        ];
        let a = aggregate_by_strike(&compute_gex_rows(&rows, 1.0));
        let b = aggregate_by_strike(&compute_gex_rows(&rows, 1e-6));
        for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
            assert_eq!(ka, kb);
            assert_eq!(va.signum(), vb.signum());
        }
    }

    #[test]
    fn merge_sums_matching_strikes() {
        let a: StrikeAggregate = [(dec!(100), 5.0), (dec!(110), -2.0)].into_iter().collect();
        let b: StrikeAggregate = [(dec!(110), 4.0), (dec!(120), 1.0)].into_iter().collect();
        let merged = merge_aggregates([&a, &b]);
        assert_eq!(merged.get(&dec!(100)), Some(&5.0));
        assert_eq!(merged.get(&dec!(110)), Some(&2.0));
        assert_eq!(merged.get(&dec!(120)), Some(&1.0));
    }
}
