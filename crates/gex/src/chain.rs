//! Single-expiry chain snapshot: exposure rows, levels, regime and plan.

use crate::exposure::{aggregate_by_strike, compute_gex_rows, GammaExposureRow, StrikeAggregate};
use crate::levels::{gamma_flip, nearest_levels, regime, top_walls, NearestLevels, Regime, Wall};
use crate::plan::{plan_from_level, Plan};
use gex_desk_core::{DeskError, ExpirySelector, MarketData, OptionQuoteRow, Result, SpotSource};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRequest {
    pub currency: String,
    pub expiry: ExpirySelector,
    pub strike_range_pct: f64,
    pub walls_n: usize,
    pub spot_source: SpotSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeExposure {
    pub strike: Decimal,
    pub net_gex: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub currency: String,
    pub expiry: ExpirySelector,
    pub spot: f64,
    pub regime: Regime,
    pub flip: Option<Decimal>,
    pub total_gex: f64,
    pub walls: Vec<Wall>,
    pub nearest: NearestLevels,
    /// Plan around the wall closest to spot, if any.
    pub plan: Option<Plan>,
    pub per_strike: Vec<StrikeExposure>,
    pub rows: Vec<GammaExposureRow>,
}

/// Builds a snapshot from already-fetched rows.
#[must_use]
pub fn build_snapshot(
    currency: &str,
    expiry: ExpirySelector,
    rows: &[OptionQuoteRow],
    spot: f64,
    scale: f64,
    walls_n: usize,
) -> ChainSnapshot {
    let gex_rows = compute_gex_rows(rows, scale);
    let aggregate = aggregate_by_strike(&gex_rows);
    let walls = top_walls(&aggregate, walls_n);
    let regime = regime(&aggregate);
    let nearest = nearest_levels(spot, &walls);
    let plan = nearest.closest(spot).and_then(|wall| {
        plan_from_level(
            spot,
            regime,
            wall.strike_f64(),
            nearest.below.map(|w| w.strike_f64()),
            nearest.above.map(|w| w.strike_f64()),
        )
    });

    ChainSnapshot {
        currency: currency.to_string(),
        expiry,
        spot,
        regime,
        flip: gamma_flip(&aggregate),
        total_gex: aggregate.values().sum(),
        walls,
        nearest,
        plan,
        per_strike: per_strike(&aggregate),
        rows: gex_rows,
    }
}

/// Fetches chain and spot concurrently and builds a snapshot.
///
/// # Errors
///
/// Returns `CollaboratorUnavailable` if either fetch fails or exceeds `timeout`.
pub async fn compute_chain(
    market: &dyn MarketData,
    request: &ChainRequest,
    scale: f64,
    timeout: Duration,
) -> Result<ChainSnapshot> {
    let chain = tokio::time::timeout(
        timeout,
        market.get_chain(&request.currency, &request.expiry, request.strike_range_pct),
    );
    let spot = tokio::time::timeout(timeout, market.get_spot(&request.currency, request.spot_source));
    let (rows, spot) = tokio::join!(chain, spot);
    let rows = rows??;
    let spot = spot??;

    if !spot.is_finite() || spot <= 0.0 {
        return Err(DeskError::unavailable(format!("invalid spot {spot} for {}", request.currency)));
    }

    tracing::debug!(
        currency = %request.currency,
        expiry = %request.expiry,
        rows = rows.len(),
        spot,
        "Computed chain snapshot"
    );

    Ok(build_snapshot(
        &request.currency,
        request.expiry.clone(),
        &rows,
        spot,
        scale,
        request.walls_n,
    ))
}

pub(crate) fn per_strike(aggregate: &StrikeAggregate) -> Vec<StrikeExposure> {
    aggregate
        .iter()
        .map(|(strike, net_gex)| StrikeExposure {
            strike: *strike,
            net_gex: *net_gex,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gex_desk_core::OptionType;
    use rust_decimal_macros::dec;

    fn row(strike: Decimal, option_type: OptionType, gamma: f64, oi: f64) -> OptionQuoteRow {
        OptionQuoteRow {
            instrument_name: format!("BTC-28MAR25-{strike}-{}", if option_type == OptionType::Call { "C" } else { "P" }),
            strike,
            option_type,
            open_interest: oi,
            gamma,
            bid_price: 0.02,
            ask_price: 0.025,
            mark_price: 0.022,
            mark_iv: 50.0,
            underlying_price: 61_000.0,
            expiry: "28MAR25".to_string(),
        }
    }

    #[test]
    fn snapshot_carries_levels_and_plan() {
        let rows = vec![
            row(dec!(60000), OptionType::Call, 2e-5, 500.0),
            row(dec!(60000), OptionType::Put, 1e-5, 100.0),
            row(dec!(62000), OptionType::Put, 3e-5, 300.0),
            row(dec!(64000), OptionType::Call, 1e-5, 50.0),
        ];
        let snap = build_snapshot("BTC", ExpirySelector::Code("28MAR25".into()), &rows, 61_000.0, 1e-6, 2);

        assert_eq!(snap.per_strike.len(), 3);
        assert_eq!(snap.walls.len(), 2);
        assert_eq!(snap.walls[0].rank, 1);
        assert_eq!(snap.flip, Some(dec!(62000)));
        assert_eq!(snap.nearest.below.map(|w| w.strike), Some(dec!(60000)));
        assert_eq!(snap.nearest.above.map(|w| w.strike), Some(dec!(62000)));
        assert!(snap.plan.is_some());
        assert_eq!(snap.rows.len(), 4);
    }

    #[test]
    fn empty_chain_is_neutral() {
        let snap = build_snapshot("BTC", ExpirySelector::All, &[], 61_000.0, 1e-6, 10);
        assert_eq!(snap.regime, Regime::Neutral);
        assert!(snap.flip.is_none());
        assert!(snap.walls.is_empty());
        assert!(snap.plan.is_none());
    }
}
