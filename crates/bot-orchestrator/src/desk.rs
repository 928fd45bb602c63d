//! Request surface over the shared desk state.
//!
//! Every method is safe to call while the control loop runs; ledger
//! mutations serialize on the ledger's own lock.

use crate::bot_handle::BotHandle;
use crate::bot_store::BotConfigStore;
use crate::commands::{BotConfigPatch, BotStatus};
use crate::events::TickReport;
use crate::state::{DeskSettings, DeskState};
use futures::future::{join_all, try_join};
use gex_desk_core::{
    parse_expiry_code, sort_expiry_codes, AppConfig, BotConfig, DeskError, ExpirySelector,
    LegQuote, MarketData, Result, SpotSource,
};
use gex_desk_gex::{compute_chain, ChainRequest, ChainSnapshot, CombinedWalls, WallQuery};
use gex_desk_paper::{
    entry_costs, resolve_quantity, value_of, CloseReason, ExitFill, JsonLedgerStore, OpenRequest,
    Position, PositionSource, PricingBasis, Valuation,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Manual straddle entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEntry {
    pub currency: String,
    pub expiry: String,
    pub strike: Decimal,
    /// Defaults to the configured bot quantity, then the minimum lot.
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Cost basis used for P&L; defaults to mark.
    #[serde(default)]
    pub basis: Option<PricingBasis>,
    #[serde(default)]
    pub spot_source: Option<SpotSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionMark {
    pub position: Position,
    pub valuation: Option<Valuation>,
    /// Set when the legs could not be quoted.
    pub error: Option<String>,
}

/// Live valuation of every open position in one currency.
#[derive(Debug, Clone, Serialize)]
pub struct MarkToMarket {
    pub currency: String,
    pub spot: f64,
    pub positions: Vec<PositionMark>,
    /// Sums over valued positions only.
    pub total_cost_usd: Decimal,
    pub total_value_usd: Decimal,
    pub total_pnl_usd: Decimal,
    pub total_pnl_pct: Decimal,
}

pub struct Desk {
    state: Arc<DeskState>,
    bot: parking_lot::Mutex<Option<(BotHandle, JoinHandle<()>)>>,
}

impl Desk {
    #[must_use]
    pub fn new(state: Arc<DeskState>) -> Self {
        Self {
            state,
            bot: parking_lot::Mutex::new(None),
        }
    }

    /// Builds a desk persisting to the paths in `config.storage`.
    ///
    /// # Errors
    ///
    /// Propagates ledger or bot-config load failures.
    pub fn from_config(config: &AppConfig, market: Arc<dyn MarketData>) -> Result<Self> {
        let ledger_store = Arc::new(JsonLedgerStore::new(&config.storage.ledger_path));
        let bot_store = BotConfigStore::new(&config.storage.bot_config_path);
        let state = DeskState::new(
            market,
            ledger_store,
            bot_store,
            config.bot.clone(),
            DeskSettings::from_config(config),
        )?;
        Ok(Self::new(Arc::new(state)))
    }

    #[must_use]
    pub fn state(&self) -> &Arc<DeskState> {
        &self.state
    }

    /// Single-expiry (or all-expiry) exposure snapshot with levels and plan.
    ///
    /// # Errors
    ///
    /// `CollaboratorUnavailable` if the chain or spot cannot be fetched.
    pub async fn compute_chain(&self, request: &ChainRequest) -> Result<ChainSnapshot> {
        compute_chain(
            self.state.market.as_ref(),
            request,
            self.state.settings.gex_scale,
            self.state.settings.fetch_timeout,
        )
        .await
    }

    /// Chain request for `currency` using the bot's range and source.
    #[must_use]
    pub fn chain_request(&self, currency: &str, expiry: ExpirySelector) -> ChainRequest {
        let config = self.state.bot_config();
        ChainRequest {
            currency: currency.to_ascii_uppercase(),
            expiry,
            strike_range_pct: config.strike_range_pct,
            walls_n: self.state.settings.chain_walls_n,
            spot_source: config.spot_source,
        }
    }

    /// # Errors
    ///
    /// `InvalidRequest` if no expiry resolves, `CollaboratorUnavailable` if
    /// every chain fetch fails.
    pub async fn compute_walls(&self, query: &WallQuery) -> Result<Arc<CombinedWalls>> {
        self.state.combiner.combine(query).await
    }

    #[must_use]
    pub fn list_open_positions(&self) -> Vec<Position> {
        self.state.ledger.list_open()
    }

    #[must_use]
    pub fn list_history(&self, limit: Option<usize>) -> Vec<Position> {
        self.state.ledger.list_history(limit)
    }

    /// Opens a paper straddle at live quotes.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a malformed entry, `CollaboratorUnavailable` if
    /// quotes or spot cannot be fetched, `Conflict` if the key is already
    /// open.
    pub async fn open_position(&self, entry: ManualEntry) -> Result<Position> {
        let currency = entry.currency.trim().to_ascii_uppercase();
        let expiry = entry.expiry.trim().to_ascii_uppercase();
        if currency.is_empty() {
            return Err(DeskError::invalid("currency is required"));
        }
        if parse_expiry_code(&expiry).is_none() {
            return Err(DeskError::invalid(format!("unrecognised expiry code {expiry:?}")));
        }
        if entry.strike <= Decimal::ZERO {
            return Err(DeskError::invalid("strike must be positive"));
        }
        if entry.quantity.is_some_and(|q| q < Decimal::ZERO) {
            return Err(DeskError::invalid("quantity must not be negative"));
        }

        let config = self.state.bot_config();
        let source = entry.spot_source.unwrap_or(config.spot_source);
        let strike = entry.strike.normalize();
        let call_name = format!("{currency}-{expiry}-{strike}-C");
        let put_name = format!("{currency}-{expiry}-{strike}-P");

        let (spot, (call, put)) = try_join(
            self.fetch(self.state.market.get_spot(&currency, source)),
            self.fetch_legs(&call_name, &put_name),
        )
        .await?;
        if !(spot.is_finite() && spot > 0.0) {
            return Err(DeskError::unavailable(format!("invalid spot {spot} for {currency}")));
        }

        let quantity = resolve_quantity(&currency, entry.quantity.unwrap_or(config.qty));
        let costs = entry_costs(&call, &put, spot, quantity);
        let basis = entry.basis.unwrap_or_default();
        if costs.for_basis(basis) <= Decimal::ZERO {
            return Err(DeskError::unavailable(format!(
                "no {basis:?} price for {call_name} / {put_name}"
            )));
        }

        let (entry_index, entry_last) = match source {
            SpotSource::Index => (Some(spot), None),
            SpotSource::Last => (None, Some(spot)),
        };
        self.state.ledger.open(OpenRequest {
            source: PositionSource::Manual,
            currency,
            expiry,
            strike,
            quantity,
            entry_spot: spot,
            entry_index,
            entry_last,
            call_instrument: call.instrument_name,
            put_instrument: put.instrument_name,
            entry_costs: costs,
            basis,
        })
    }

    /// Closes an open position at current mark.
    ///
    /// # Errors
    ///
    /// `NotFound` if `id` is not open, `CollaboratorUnavailable` if quotes
    /// cannot be fetched.
    pub async fn close_position(&self, id: &str) -> Result<Position> {
        let position = self
            .state
            .ledger
            .get_open(id)
            .ok_or_else(|| DeskError::not_found(id))?;
        let source = self.state.bot_config().spot_source;

        let (spot, (call, put)) = try_join(
            self.fetch(self.state.market.get_spot(&position.currency, source)),
            self.fetch_legs(&position.call_instrument, &position.put_instrument),
        )
        .await?;

        let valuation = value_of(&position, &call, &put, spot);
        self.state.ledger.close(
            id,
            ExitFill {
                reason: CloseReason::Manual,
                exit_spot: spot,
                exit_value_usd: valuation.value_usd,
            },
        )
    }

    #[must_use]
    pub fn get_bot_config(&self) -> BotConfig {
        self.state.bot_config()
    }

    /// # Errors
    ///
    /// `InvalidRequest` if the patch is rejected.
    pub fn set_bot_config(&self, patch: &BotConfigPatch) -> Result<BotConfig> {
        self.state.patch_bot_config(patch)
    }

    #[must_use]
    pub fn get_bot_status(&self) -> BotStatus {
        if let Some((handle, _)) = self.bot.lock().as_ref() {
            return handle.status();
        }
        BotStatus::idle(
            &self.state.bot_config(),
            self.state.ledger.open_count(),
            self.state.ledger.is_degraded() || self.state.config_degraded(),
        )
    }

    /// Most recent tick reports, newest first.
    #[must_use]
    pub fn bot_audit(&self, limit: usize) -> Vec<TickReport> {
        self.state.audit.recent(limit)
    }

    /// Values open positions in `currency` at live quotes.
    ///
    /// # Errors
    ///
    /// `CollaboratorUnavailable` if spot cannot be fetched. Per-position
    /// quote failures are reported inline.
    pub async fn mark_to_market(&self, currency: &str) -> Result<MarkToMarket> {
        let currency = currency.trim().to_ascii_uppercase();
        let source = self.state.bot_config().spot_source;
        let spot = self.fetch(self.state.market.get_spot(&currency, source)).await?;

        let open: Vec<Position> = self
            .state
            .ledger
            .list_open()
            .into_iter()
            .filter(|p| p.currency == currency)
            .collect();

        let quotes = join_all(
            open.iter()
                .map(|p| self.fetch_legs(&p.call_instrument, &p.put_instrument)),
        )
        .await;

        let mut total_cost = Decimal::ZERO;
        let mut total_value = Decimal::ZERO;
        let positions = open
            .into_iter()
            .zip(quotes)
            .map(|(position, quotes)| match quotes {
                Ok((call, put)) => {
                    let valuation = value_of(&position, &call, &put, spot);
                    total_cost += position.entry_cost();
                    total_value += valuation.value_usd;
                    PositionMark {
                        position,
                        valuation: Some(valuation),
                        error: None,
                    }
                }
                Err(e) => PositionMark {
                    position,
                    valuation: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        let total_pnl = total_value - total_cost;
        let total_pnl_pct = if total_cost.is_zero() {
            Decimal::ZERO
        } else {
            (total_pnl / total_cost * Decimal::ONE_HUNDRED).round_dp(2)
        };

        Ok(MarkToMarket {
            currency,
            spot,
            positions,
            total_cost_usd: total_cost,
            total_value_usd: total_value,
            total_pnl_usd: total_pnl,
            total_pnl_pct,
        })
    }

    /// Active expiry codes, nearest first.
    ///
    /// # Errors
    ///
    /// `CollaboratorUnavailable` if the venue cannot be reached.
    pub async fn list_expiries(&self, currency: &str) -> Result<Vec<String>> {
        let currency = currency.trim().to_ascii_uppercase();
        let mut codes = self.fetch(self.state.market.list_expiries(&currency)).await?;
        for code in &mut codes {
            *code = code.to_ascii_uppercase();
        }
        codes.sort();
        codes.dedup();
        sort_expiry_codes(&mut codes);
        Ok(codes)
    }

    /// Starts the control loop if it is not already running.
    pub fn start_bot(&self) -> BotHandle {
        let mut bot = self.bot.lock();
        if let Some((handle, task)) = bot.as_ref() {
            if !task.is_finished() {
                return handle.clone();
            }
        }
        let (handle, task) = BotHandle::spawn(Arc::clone(&self.state));
        *bot = Some((handle.clone(), task));
        handle
    }

    /// Stops the control loop and waits for it to exit.
    pub async fn shutdown(&self) {
        let Some((handle, task)) = self.bot.lock().take() else {
            return;
        };
        handle.shutdown().await;
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Control loop task failed");
        }
    }

    async fn fetch<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.state.settings.fetch_timeout, fut).await?
    }

    async fn fetch_legs(&self, call: &str, put: &str) -> Result<(LegQuote, LegQuote)> {
        self.fetch(try_join(
            self.state.market.get_leg_quote(call),
            self.state.market.get_leg_quote(put),
        ))
        .await
    }
}
