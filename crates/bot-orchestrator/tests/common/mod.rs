#![allow(dead_code)]

use async_trait::async_trait;
use gex_desk_bot::{BotActor, BotStatus, DeskSettings, DeskState};
use gex_desk_bot::BotConfigStore;
use gex_desk_core::{
    BotConfig, DeskError, ExpirySelector, LegQuote, MarketData, OptionQuoteRow, OptionType,
    Result, SpotSource,
};
use gex_desk_paper::{LedgerStore, MemoryLedgerStore};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

pub const EXPIRY: &str = "28MAR25";

/// Scriptable venue: one BTC chain, a settable spot and per-leg quotes.
pub struct FakeMarket {
    spot: Mutex<Option<f64>>,
    /// When set, spot requests never complete.
    hang_spot: AtomicBool,
    rows: Vec<OptionQuoteRow>,
    quotes: Mutex<HashMap<String, LegQuote>>,
}

impl FakeMarket {
    pub fn new(spot: f64) -> Self {
        let rows = vec![
            row(dec!(58000), OptionType::Put, 1e-5, 300.0),
            row(dec!(58000), OptionType::Call, 1e-6, 50.0),
            row(dec!(60000), OptionType::Call, 5e-5, 1000.0),
            row(dec!(60000), OptionType::Put, 1e-5, 200.0),
            row(dec!(62000), OptionType::Call, 2e-5, 400.0),
            row(dec!(62000), OptionType::Put, 1e-6, 20.0),
        ];
        let quotes = rows
            .iter()
            .map(|r| (r.instrument_name.clone(), LegQuote::from(r)))
            .collect();
        Self {
            spot: Mutex::new(Some(spot)),
            hang_spot: AtomicBool::new(false),
            rows,
            quotes: Mutex::new(quotes),
        }
    }

    pub fn set_spot(&self, spot: Option<f64>) {
        *self.spot.lock() = spot;
    }

    pub fn hang_spot(&self, hang: bool) {
        self.hang_spot.store(hang, Ordering::SeqCst);
    }

    pub fn set_mark(&self, instrument: &str, mark: f64) {
        if let Some(quote) = self.quotes.lock().get_mut(instrument) {
            quote.mark_price = mark;
        }
    }

    pub fn remove_quote(&self, instrument: &str) {
        self.quotes.lock().remove(instrument);
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn get_chain(
        &self,
        _currency: &str,
        expiry: &ExpirySelector,
        _strike_range_pct: f64,
    ) -> Result<Vec<OptionQuoteRow>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| expiry.matches(&r.expiry))
            .cloned()
            .collect())
    }

    async fn get_spot(&self, currency: &str, _source: SpotSource) -> Result<f64> {
        if self.hang_spot.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        (*self.spot.lock()).ok_or_else(|| DeskError::unavailable(format!("no spot for {currency}")))
    }

    async fn list_expiries(&self, _currency: &str) -> Result<Vec<String>> {
        Ok(vec![EXPIRY.to_string()])
    }

    async fn get_leg_quote(&self, instrument_name: &str) -> Result<LegQuote> {
        self.quotes
            .lock()
            .get(instrument_name)
            .cloned()
            .ok_or_else(|| DeskError::unavailable(format!("no quote for {instrument_name}")))
    }
}

pub fn row(strike: Decimal, option_type: OptionType, gamma: f64, oi: f64) -> OptionQuoteRow {
    let suffix = if option_type == OptionType::Call { "C" } else { "P" };
    OptionQuoteRow {
        instrument_name: format!("BTC-{EXPIRY}-{strike}-{suffix}"),
        strike,
        option_type,
        open_interest: oi,
        gamma,
        bid_price: 0.018,
        ask_price: 0.02,
        mark_price: 0.019,
        mark_iv: 48.0,
        underlying_price: 60_000.0,
        expiry: EXPIRY.to_string(),
    }
}

pub fn armed_config() -> BotConfig {
    BotConfig {
        enabled: true,
        auto_entry: true,
        expiries: vec![EXPIRY.to_string()],
        cooldown_sec: 15,
        ..BotConfig::default()
    }
}

pub fn settings() -> DeskSettings {
    DeskSettings {
        fetch_timeout: Duration::from_secs(1),
        tick_interval: Duration::from_millis(20),
        walls_cache_ttl: Duration::ZERO,
        ..DeskSettings::default()
    }
}

pub fn desk_state(market: Arc<FakeMarket>, config: BotConfig) -> Arc<DeskState> {
    desk_state_with(market, config, BotConfigStore::in_memory())
}

pub fn desk_state_with(
    market: Arc<FakeMarket>,
    config: BotConfig,
    bot_store: BotConfigStore,
) -> Arc<DeskState> {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::default());
    Arc::new(DeskState::new(market, store, bot_store, config, settings()).unwrap())
}

/// An actor driven tick by tick from the test.
pub fn actor(state: Arc<DeskState>) -> (BotActor, CancellationToken, watch::Receiver<BotStatus>) {
    let (_tx, rx) = mpsc::channel(1);
    let (status_tx, status_rx) = watch::channel(BotStatus::idle(&state.bot_config(), 0, false));
    let cancel = CancellationToken::new();
    (BotActor::new(state, rx, status_tx, cancel.clone()), cancel, status_rx)
}
