use crate::error::Result;
use crate::types::{ExpirySelector, LegQuote, OptionQuoteRow, SpotSource};
use async_trait::async_trait;

/// Read-only market-data collaborator.
///
/// Implementations must be idempotent and side-effect free from the desk's
/// point of view. Timeouts are applied by callers.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Option rows for `currency`, restricted to `expiry` and to strikes within
    /// `strike_range_pct` percent of spot.
    async fn get_chain(
        &self,
        currency: &str,
        expiry: &ExpirySelector,
        strike_range_pct: f64,
    ) -> Result<Vec<OptionQuoteRow>>;

    /// Current spot for `currency` from the requested source.
    async fn get_spot(&self, currency: &str, source: SpotSource) -> Result<f64>;

    /// Active expiry codes for `currency`, in any order.
    async fn list_expiries(&self, currency: &str) -> Result<Vec<String>>;

    /// Live quote for one option leg.
    async fn get_leg_quote(&self, instrument_name: &str) -> Result<LegQuote>;
}
