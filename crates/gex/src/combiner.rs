//! Multi-expiry wall combiner.
//!
//! Resolves a set of expiries, fetches each chain concurrently, sums the
//! per-strike exposure across expiries and ranks walls on the combined
//! profile. Results are cached as immutable `Arc` snapshots keyed by every
//! query input.

use crate::chain::{per_strike, StrikeExposure};
use crate::exposure::{aggregate_by_strike, compute_gex_rows, merge_aggregates, StrikeAggregate};
use crate::levels::{gamma_flip, regime, top_walls, Regime, Wall};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use gex_desk_core::{
    days_to_expiry, sort_expiry_codes, DeskError, ExpirySelector, MarketData,
    OptionQuoteRow, OptionType, Result, TtlCache,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// How the combiner picks expiries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ExpiryMode {
    Explicit { codes: Vec<String> },
    /// The `count` nearest non-expired expiries.
    Nearest { count: usize },
    /// Expiries whose DTE lies in `[min_days, max_days]`.
    DteRange { min_days: i64, max_days: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallQuery {
    pub currency: String,
    pub expiries: ExpiryMode,
    pub strike_range_pct: f64,
    pub walls_n: usize,
}

impl WallQuery {
    fn cache_key(&self) -> String {
        format!(
            "{}|{:?}|{}|{}",
            self.currency.to_ascii_uppercase(),
            self.expiries,
            self.strike_range_pct,
            self.walls_n
        )
    }
}

/// Rows fetched for one expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryChain {
    pub expiry: String,
    pub rows: Vec<OptionQuoteRow>,
}

/// Call and put rows at one strike of one expiry.
#[derive(Debug, Clone)]
pub struct StraddleLegs<'a> {
    pub expiry: &'a str,
    pub call: &'a OptionQuoteRow,
    pub put: &'a OptionQuoteRow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedWalls {
    pub currency: String,
    /// Expiries that contributed, nearest first.
    pub expiries_used: Vec<String>,
    /// Expiries whose fetch failed.
    pub expiries_skipped: Vec<String>,
    pub regime: Regime,
    pub flip: Option<Decimal>,
    pub walls: Vec<Wall>,
    pub per_strike: Vec<StrikeExposure>,
    pub chains: Vec<ExpiryChain>,
    pub computed_at: DateTime<Utc>,
}

impl CombinedWalls {
    /// Straddle legs available at `strike`, nearest expiry first.
    #[must_use]
    pub fn legs_at(&self, strike: Decimal) -> Vec<StraddleLegs<'_>> {
        self.chains
            .iter()
            .filter_map(|chain| {
                let call = chain
                    .rows
                    .iter()
                    .find(|r| r.strike == strike && r.option_type == OptionType::Call)?;
                let put = chain
                    .rows
                    .iter()
                    .find(|r| r.strike == strike && r.option_type == OptionType::Put)?;
                Some(StraddleLegs {
                    expiry: &chain.expiry,
                    call,
                    put,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CombinerSettings {
    pub scale: f64,
    pub max_expiries: usize,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
}

impl Default for CombinerSettings {
    fn default() -> Self {
        Self {
            scale: 1e-6,
            max_expiries: 8,
            cache_ttl: Duration::from_secs(20),
            fetch_timeout: Duration::from_secs(8),
        }
    }
}

pub struct WallCombiner {
    market: Arc<dyn MarketData>,
    cache: TtlCache<String, Arc<CombinedWalls>>,
    settings: CombinerSettings,
}

impl WallCombiner {
    pub fn new(market: Arc<dyn MarketData>, settings: CombinerSettings) -> Self {
        Self {
            market,
            cache: TtlCache::new(settings.cache_ttl),
            settings,
        }
    }

    #[must_use]
    pub fn market(&self) -> &Arc<dyn MarketData> {
        &self.market
    }

    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    /// Combined walls for `query`, served from cache while fresh.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when no expiry resolves, `CollaboratorUnavailable`
    /// when the expiry listing fails or every chain fetch fails.
    pub async fn combine(&self, query: &WallQuery) -> Result<Arc<CombinedWalls>> {
        let key = query.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(key = %key, "Wall cache hit");
            return Ok(hit);
        }

        let today = Utc::now().date_naive();
        let expiries = self.resolve_expiries(&query.currency, &query.expiries, today).await?;
        if expiries.is_empty() {
            return Err(DeskError::invalid(format!(
                "no expiries selected for {}",
                query.currency
            )));
        }

        let combined = Arc::new(self.fetch_and_combine(query, expiries).await?);
        self.cache.insert(key, Arc::clone(&combined));
        Ok(combined)
    }

    /// Resolves the expiry mode to at most `max_expiries` codes, nearest first.
    ///
    /// # Errors
    ///
    /// Propagates a failed or timed-out expiry listing.
    pub async fn resolve_expiries(
        &self,
        currency: &str,
        mode: &ExpiryMode,
        today: NaiveDate,
    ) -> Result<Vec<String>> {
        let mut codes: Vec<String> = match mode {
            ExpiryMode::Explicit { codes } => {
                let mut out: Vec<String> = Vec::with_capacity(codes.len());
                for code in codes {
                    let code = code.trim().to_ascii_uppercase();
                    if !code.is_empty() && !out.contains(&code) {
                        out.push(code);
                    }
                }
                out
            }
            ExpiryMode::Nearest { count } => {
                let listed = self.list_expiries(currency).await?;
                let mut live: Vec<String> = listed
                    .into_iter()
                    .filter(|c| days_to_expiry(c, today).is_some_and(|d| d >= 0))
                    .collect();
                sort_expiry_codes(&mut live);
                live.truncate(*count);
                live
            }
            ExpiryMode::DteRange { min_days, max_days } => self
                .list_expiries(currency)
                .await?
                .into_iter()
                .filter(|c| {
                    days_to_expiry(c, today).is_some_and(|d| d >= *min_days && d <= *max_days)
                })
                .collect(),
        };

        sort_expiry_codes(&mut codes);
        if codes.len() > self.settings.max_expiries {
            tracing::debug!(
                requested = codes.len(),
                cap = self.settings.max_expiries,
                "Capping combined expiries"
            );
            codes.truncate(self.settings.max_expiries);
        }
        Ok(codes)
    }

    async fn list_expiries(&self, currency: &str) -> Result<Vec<String>> {
        tokio::time::timeout(self.settings.fetch_timeout, self.market.list_expiries(currency)).await?
    }

    async fn fetch_and_combine(&self, query: &WallQuery, expiries: Vec<String>) -> Result<CombinedWalls> {
        let fetches = expiries.iter().map(|expiry| {
            let selector = ExpirySelector::Code(expiry.clone());
            async move {
                let result = tokio::time::timeout(
                    self.settings.fetch_timeout,
                    self.market.get_chain(&query.currency, &selector, query.strike_range_pct),
                )
                .await;
                (expiry.clone(), result.map_err(DeskError::from).and_then(|r| r))
            }
        });

        let mut chains = Vec::with_capacity(expiries.len());
        let mut aggregates: Vec<StrikeAggregate> = Vec::with_capacity(expiries.len());
        let mut skipped = Vec::new();

        for (expiry, result) in join_all(fetches).await {
            match result {
                Ok(rows) => {
                    aggregates.push(aggregate_by_strike(&compute_gex_rows(&rows, self.settings.scale)));
                    chains.push(ExpiryChain { expiry, rows });
                }
                Err(e) => {
                    tracing::warn!(
                        currency = %query.currency,
                        expiry = %expiry,
                        error = %e,
                        "Chain fetch failed, skipping expiry"
                    );
                    skipped.push(expiry);
                }
            }
        }

        if chains.is_empty() {
            return Err(DeskError::unavailable(format!(
                "all {} chain fetches failed for {}",
                skipped.len(),
                query.currency
            )));
        }

        let combined = merge_aggregates(&aggregates);
        let walls = top_walls(&combined, query.walls_n);

        tracing::debug!(
            currency = %query.currency,
            expiries = chains.len(),
            skipped = skipped.len(),
            strikes = combined.len(),
            walls = walls.len(),
            "Combined walls"
        );

        Ok(CombinedWalls {
            currency: query.currency.clone(),
            expiries_used: chains.iter().map(|c| c.expiry.clone()).collect(),
            expiries_skipped: skipped,
            regime: regime(&combined),
            flip: gamma_flip(&combined),
            walls,
            per_strike: per_strike(&combined),
            chains,
            computed_at: Utc::now(),
        })
    }
}
