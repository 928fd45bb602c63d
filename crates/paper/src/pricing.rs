//! Leg prices and straddle premiums.
//!
//! Venue prices are in units of the underlying; USD = price x spot x qty.

use crate::types::{EntryCosts, PricingBasis};
use gex_desk_core::LegQuote;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Average of bid and ask when both are quoted, otherwise whichever side is.
#[must_use]
pub fn mid_price(bid: f64, ask: f64) -> f64 {
    let bid = if bid.is_finite() && bid > 0.0 { bid } else { 0.0 };
    let ask = if ask.is_finite() && ask > 0.0 { ask } else { 0.0 };
    match (bid > 0.0, ask > 0.0) {
        (true, true) => (bid + ask) / 2.0,
        (true, false) => bid,
        (false, true) => ask,
        (false, false) => 0.0,
    }
}

/// Leg price under `basis`. Mark falls back to mid when the venue has none.
#[must_use]
pub fn leg_price(quote: &LegQuote, basis: PricingBasis) -> f64 {
    match basis {
        PricingBasis::Ask => {
            if quote.ask_price.is_finite() && quote.ask_price > 0.0 {
                quote.ask_price
            } else {
                0.0
            }
        }
        PricingBasis::Mid => mid_price(quote.bid_price, quote.ask_price),
        PricingBasis::Mark => {
            if quote.mark_price.is_finite() && quote.mark_price > 0.0 {
                quote.mark_price
            } else {
                mid_price(quote.bid_price, quote.ask_price)
            }
        }
    }
}

/// Straddle premium in USD, rounded to cents.
#[must_use]
pub fn straddle_usd(call: &LegQuote, put: &LegQuote, spot: f64, quantity: Decimal, basis: PricingBasis) -> Decimal {
    let per_contract = (leg_price(call, basis) + leg_price(put, basis)) * spot;
    usd(per_contract) * quantity
}

/// Entry costs under all three conventions.
#[must_use]
pub fn entry_costs(call: &LegQuote, put: &LegQuote, spot: f64, quantity: Decimal) -> EntryCosts {
    EntryCosts {
        ask_usd: straddle_usd(call, put, spot, quantity, PricingBasis::Ask).round_dp(2),
        mid_usd: straddle_usd(call, put, spot, quantity, PricingBasis::Mid).round_dp(2),
        mark_usd: straddle_usd(call, put, spot, quantity, PricingBasis::Mark).round_dp(2),
    }
}

/// Venue minimum contract size for `currency`; used when quantity is zero.
#[must_use]
pub fn min_lot(currency: &str) -> Decimal {
    if currency.eq_ignore_ascii_case("BTC") {
        Decimal::new(1, 1)
    } else {
        Decimal::ONE
    }
}

/// `quantity`, or the minimum lot when it is not positive.
#[must_use]
pub fn resolve_quantity(currency: &str, quantity: Decimal) -> Decimal {
    if quantity > Decimal::ZERO {
        quantity
    } else {
        min_lot(currency)
    }
}

fn usd(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(bid: f64, ask: f64, mark: f64) -> LegQuote {
        LegQuote {
            instrument_name: "BTC-28MAR25-70000-C".to_string(),
            bid_price: bid,
            ask_price: ask,
            mark_price: mark,
            underlying_price: 70_000.0,
        }
    }

    #[test]
    fn mid_uses_available_side() {
        assert!((mid_price(0.01, 0.02) - 0.015).abs() < 1e-12);
        assert!((mid_price(0.0, 0.02) - 0.02).abs() < 1e-12);
        assert!((mid_price(0.01, 0.0) - 0.01).abs() < 1e-12);
        assert!(mid_price(0.0, 0.0).abs() < f64::EPSILON);
        assert!((mid_price(f64::NAN, 0.02) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn crossed_book_is_tolerated() {
        let q = quote(0.03, 0.02, 0.0);
        assert!((leg_price(&q, PricingBasis::Mid) - 0.025).abs() < 1e-12);
        assert!((leg_price(&q, PricingBasis::Ask) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn mark_falls_back_to_mid() {
        assert!((leg_price(&quote(0.01, 0.03, 0.0), PricingBasis::Mark) - 0.02).abs() < 1e-12);
        assert!((leg_price(&quote(0.01, 0.03, 0.025), PricingBasis::Mark) - 0.025).abs() < 1e-12);
    }

    #[test]
    fn straddle_premium_in_usd() {
        let call = quote(0.010, 0.012, 0.011);
        let put = quote(0.008, 0.010, 0.009);
        let costs = entry_costs(&call, &put, 50_000.0, dec!(0.1));
        // (0.012 + 0.010) * 50000 * 0.1
        assert_eq!(costs.ask_usd, dec!(110.00));
        // (0.011 + 0.009) * 50000 * 0.1
        assert_eq!(costs.mid_usd, dec!(100.00));
        assert_eq!(costs.mark_usd, dec!(100.00));
    }

    #[test]
    fn quantity_defaults_to_min_lot() {
        assert_eq!(resolve_quantity("BTC", Decimal::ZERO), dec!(0.1));
        assert_eq!(resolve_quantity("eth", Decimal::ZERO), dec!(1));
        assert_eq!(resolve_quantity("BTC", dec!(2)), dec!(2));
    }
}
