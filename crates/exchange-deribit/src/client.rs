//! Deribit public REST client with rate limiting.
//!
//! Read-only: instruments, tickers and index prices. No authentication is
//! needed for any endpoint used here.
//!
//! # Example
//!
//! ```ignore
//! use gex_desk_deribit::{DeribitClient, DeribitClientConfig};
//! use gex_desk_core::ExpirySelector;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DeribitClient::new(DeribitClientConfig::default())?;
//!     let spot = client.get_index_price("BTC").await?;
//!     let rows = client.fetch_chain("BTC", &ExpirySelector::All, 8.0).await?;
//!     println!("{} rows around {spot}", rows.len());
//!     Ok(())
//! }
//! ```

use crate::error::{DeribitError, Result};
use crate::types::{IndexPrice, Instrument, RpcEnvelope, Ticker};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gex_desk_core::{
    expiry_from_instrument, DeribitConfig, ExpirySelector, LegQuote, MarketData, OptionQuoteRow,
    SpotSource,
};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Deribit production API base URL.
pub const DERIBIT_PROD_URL: &str = "https://www.deribit.com/api/v2";

/// Deribit testnet API base URL.
pub const DERIBIT_TEST_URL: &str = "https://test.deribit.com/api/v2";

#[derive(Debug, Clone)]
pub struct DeribitClientConfig {
    pub base_url: String,
    pub requests_per_second: NonZeroU32,
    pub timeout_secs: u64,
    /// Nearest-to-spot instruments kept per chain fetch.
    pub max_instruments: usize,
    /// Concurrent ticker requests per chain fetch.
    pub fetch_concurrency: usize,
}

impl Default for DeribitClientConfig {
    fn default() -> Self {
        Self {
            base_url: DERIBIT_PROD_URL.to_string(),
            requests_per_second: nonzero!(20u32),
            timeout_secs: 6,
            max_instruments: 160,
            fetch_concurrency: 14,
        }
    }
}

impl DeribitClientConfig {
    /// Builds a client config from the `[deribit]` settings section.
    #[must_use]
    pub fn from_settings(settings: &DeribitConfig) -> Self {
        Self {
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            requests_per_second: NonZeroU32::new(settings.requests_per_second)
                .unwrap_or(nonzero!(20u32)),
            timeout_secs: settings.timeout_secs.max(1),
            max_instruments: settings.max_instruments.max(1),
            fetch_concurrency: settings.fetch_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn testnet() -> Self {
        Self {
            base_url: DERIBIT_TEST_URL.to_string(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Deribit public REST client.
pub struct DeribitClient {
    config: DeribitClientConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for DeribitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeribitClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_second", &self.config.requests_per_second)
            .finish_non_exhaustive()
    }
}

impl DeribitClient {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: DeribitClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("gex-desk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeribitError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_second(config.requests_per_second);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Instrument names travel as query parameters; reject anything that is
    /// not `[A-Za-z0-9_-]`.
    fn validate_instrument(name: &str) -> Result<&str> {
        if name.is_empty() || name.len() > 64 {
            return Err(DeribitError::InvalidInstrument(name.to_string()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DeribitError::InvalidInstrument(name.to_string()));
        }
        Ok(name)
    }

    /// Waits for the rate limiter and performs a GET, unwrapping the
    /// JSON-RPC envelope.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!(url = %url, ?query, "GET");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            return Err(DeribitError::RateLimit {
                retry_after_secs: retry_after,
            });
        }

        let text = response.text().await?;
        // Deribit reports most failures as HTTP 400 with a JSON-RPC error body.
        let envelope: RpcEnvelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => return Err(DeribitError::http(status.as_u16(), text)),
        };

        if let Some(error) = envelope.error {
            return Err(DeribitError::api(error.code, error.message));
        }
        if !status.is_success() {
            return Err(DeribitError::http(status.as_u16(), text));
        }
        envelope
            .result
            .ok_or_else(|| DeribitError::EmptyResult(path.to_string()))
    }

    /// Active (unexpired) options for `currency`.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
        let currency = currency.to_ascii_uppercase();
        self.get(
            "/public/get_instruments",
            &[("currency", currency.as_str()), ("kind", "option"), ("expired", "false")],
        )
        .await
    }

    /// # Errors
    /// Returns error if the name is invalid or the API call fails.
    pub async fn get_ticker(&self, instrument_name: &str) -> Result<Ticker> {
        let name = Self::validate_instrument(instrument_name)?;
        self.get("/public/ticker", &[("instrument_name", name)]).await
    }

    /// Index price, e.g. `btc_usd` for BTC.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_index_price(&self, currency: &str) -> Result<f64> {
        let index_name = format!("{}_usd", currency.to_ascii_lowercase());
        let index: IndexPrice = self
            .get("/public/get_index_price", &[("index_name", index_name.as_str())])
            .await?;
        Ok(index.index_price)
    }

    /// Last traded price of the `{CUR}-PERPETUAL` contract.
    ///
    /// # Errors
    /// Returns error if the API call fails or the perpetual has no last price.
    pub async fn get_perpetual_last(&self, currency: &str) -> Result<f64> {
        let name = format!("{}-PERPETUAL", currency.to_ascii_uppercase());
        let ticker = self.get_ticker(&name).await?;
        ticker
            .last_price
            .or(ticker.index_price)
            .ok_or(DeribitError::EmptyResult(name))
    }

    /// Option rows within `strike_range_pct` percent of index spot.
    ///
    /// Tickers are fetched concurrently, at most `fetch_concurrency` at a
    /// time; instruments whose ticker fails are dropped.
    ///
    /// # Errors
    /// Returns error if instruments or spot cannot be fetched, or if every
    /// ticker request fails.
    pub async fn fetch_chain(
        &self,
        currency: &str,
        expiry: &ExpirySelector,
        strike_range_pct: f64,
    ) -> Result<Vec<OptionQuoteRow>> {
        let (instruments, spot) =
            futures::try_join!(self.get_instruments(currency), self.get_index_price(currency))?;

        let candidates = select_candidates(
            &instruments,
            expiry,
            spot,
            strike_range_pct,
            self.config.max_instruments,
        );
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let requested = candidates.len();
        let fetches: Vec<_> = candidates
            .into_iter()
            .map(|inst| async move {
                match self.get_ticker(&inst.instrument_name).await {
                    Ok(ticker) => to_row(inst, &ticker, spot),
                    Err(e) => {
                        tracing::debug!(instrument = %inst.instrument_name, error = %e, "Ticker fetch failed");
                        None
                    }
                }
            })
            .collect();
        let rows: Vec<OptionQuoteRow> = stream::iter(fetches)
            .buffer_unordered(self.config.fetch_concurrency)
            .filter_map(|row| async move { row })
            .collect()
            .await;

        if rows.is_empty() {
            return Err(DeribitError::Network(format!(
                "all {requested} ticker requests failed for {currency}"
            )));
        }

        tracing::debug!(currency, requested, received = rows.len(), spot, "Fetched option chain");
        Ok(rows)
    }
}

/// Instruments for `expiry` within the strike window, nearest to spot first,
/// capped at `max`.
fn select_candidates<'a>(
    instruments: &'a [Instrument],
    expiry: &ExpirySelector,
    spot: f64,
    strike_range_pct: f64,
    max: usize,
) -> Vec<&'a Instrument> {
    let window = strike_range_pct / 100.0;
    let mut candidates: Vec<&Instrument> = instruments
        .iter()
        .filter(|inst| inst.is_active.unwrap_or(true))
        .filter(|inst| {
            expiry_from_instrument(&inst.instrument_name).is_some_and(|code| expiry.matches(code))
        })
        .filter(|inst| {
            let strike = inst.strike();
            strike > 0.0 && (strike - spot).abs() / spot.max(1.0) <= window
        })
        .collect();

    candidates.sort_by(|a, b| {
        (a.strike() - spot)
            .abs()
            .total_cmp(&(b.strike() - spot).abs())
            .then_with(|| a.instrument_name.cmp(&b.instrument_name))
    });
    candidates.truncate(max);
    candidates
}

fn to_row(inst: &Instrument, ticker: &Ticker, spot: f64) -> Option<OptionQuoteRow> {
    let strike = Decimal::from_f64(inst.strike())?.normalize();
    let expiry = expiry_from_instrument(&inst.instrument_name)?.to_ascii_uppercase();
    Some(OptionQuoteRow {
        instrument_name: inst.instrument_name.clone(),
        strike,
        option_type: inst.option_type(),
        open_interest: ticker.open_interest.unwrap_or(0.0),
        gamma: ticker.gamma(),
        bid_price: ticker.best_bid_price.unwrap_or(0.0),
        ask_price: ticker.best_ask_price.unwrap_or(0.0),
        mark_price: ticker.mark_price.unwrap_or(0.0),
        mark_iv: ticker.mark_iv.unwrap_or(0.0),
        underlying_price: spot,
        expiry,
    })
}

#[async_trait]
impl MarketData for DeribitClient {
    async fn get_chain(
        &self,
        currency: &str,
        expiry: &ExpirySelector,
        strike_range_pct: f64,
    ) -> gex_desk_core::Result<Vec<OptionQuoteRow>> {
        Ok(self.fetch_chain(currency, expiry, strike_range_pct).await?)
    }

    async fn get_spot(&self, currency: &str, source: SpotSource) -> gex_desk_core::Result<f64> {
        let spot = match source {
            SpotSource::Index => self.get_index_price(currency).await?,
            SpotSource::Last => self.get_perpetual_last(currency).await?,
        };
        Ok(spot)
    }

    async fn list_expiries(&self, currency: &str) -> gex_desk_core::Result<Vec<String>> {
        let instruments = self.get_instruments(currency).await?;
        let codes: BTreeSet<String> = instruments
            .iter()
            .filter_map(|inst| expiry_from_instrument(&inst.instrument_name))
            .map(str::to_ascii_uppercase)
            .collect();
        Ok(codes.into_iter().collect())
    }

    async fn get_leg_quote(&self, instrument_name: &str) -> gex_desk_core::Result<LegQuote> {
        Ok(self.get_ticker(instrument_name).await?.to_leg_quote())
    }
}
