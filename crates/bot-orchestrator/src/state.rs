//! Shared desk state: one instance per process, owned through `Arc` by the
//! request facade and the control loop.

use crate::bot_store::BotConfigStore;
use crate::commands::BotConfigPatch;
use crate::events::DecisionAudit;
use gex_desk_core::{AppConfig, BotConfig, MarketData, Result};
use gex_desk_gex::{CombinerSettings, WallCombiner};
use gex_desk_paper::{LedgerStore, PositionLedger};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DeskSettings {
    pub gex_scale: f64,
    pub chain_walls_n: usize,
    pub fetch_timeout: Duration,
    pub tick_interval: Duration,
    pub walls_cache_ttl: Duration,
    pub max_combine_expiries: usize,
    pub history_cap: usize,
    pub audit_len: usize,
}

impl DeskSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            gex_scale: config.analytics.gex_scale,
            chain_walls_n: config.analytics.chain_walls_n,
            fetch_timeout: Duration::from_millis(config.control.fetch_timeout_ms),
            tick_interval: Duration::from_millis(config.control.tick_interval_ms.max(1)),
            walls_cache_ttl: Duration::from_secs(config.analytics.walls_cache_ttl_secs),
            max_combine_expiries: config.analytics.max_combine_expiries,
            history_cap: config.storage.history_cap,
            audit_len: config.control.audit_len,
        }
    }
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct DeskState {
    pub market: Arc<dyn MarketData>,
    pub ledger: PositionLedger,
    pub combiner: WallCombiner,
    pub audit: DecisionAudit,
    pub settings: DeskSettings,
    config: RwLock<BotConfig>,
    /// Held across mutate-then-save so saves land in mutation order.
    save_lock: Mutex<()>,
    bot_store: BotConfigStore,
    config_degraded: AtomicBool,
}

impl DeskState {
    /// Builds the state, preferring a persisted bot config over `initial`.
    ///
    /// # Errors
    ///
    /// Propagates ledger or bot-config load failures.
    pub fn new(
        market: Arc<dyn MarketData>,
        ledger_store: Arc<dyn LedgerStore>,
        bot_store: BotConfigStore,
        initial: BotConfig,
        settings: DeskSettings,
    ) -> Result<Self> {
        let ledger = PositionLedger::load(ledger_store, settings.history_cap)?;
        let config = bot_store.load()?.unwrap_or(initial);
        let combiner = WallCombiner::new(
            Arc::clone(&market),
            CombinerSettings {
                scale: settings.gex_scale,
                max_expiries: settings.max_combine_expiries,
                cache_ttl: settings.walls_cache_ttl,
                fetch_timeout: settings.fetch_timeout,
            },
        );

        tracing::info!(
            currency = %config.currency,
            enabled = config.enabled,
            auto_entry = config.auto_entry,
            expiries = ?config.expiries,
            "Desk state ready"
        );

        Ok(Self {
            market,
            ledger,
            combiner,
            audit: DecisionAudit::new(settings.audit_len),
            settings,
            config: RwLock::new(config),
            save_lock: Mutex::new(()),
            bot_store,
            config_degraded: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn bot_config(&self) -> BotConfig {
        self.config.read().clone()
    }

    /// Validates and applies `patch`, then persists the result.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the patch is rejected. A failed save is logged and
    /// the applied config is kept.
    pub fn patch_bot_config(&self, patch: &BotConfigPatch) -> Result<BotConfig> {
        let _saving = self.save_lock.lock();
        let next = {
            let mut config = self.config.write();
            let next = patch.apply(&config)?;
            *config = next.clone();
            next
        };
        tracing::info!(
            enabled = next.enabled,
            auto_entry = next.auto_entry,
            currency = %next.currency,
            "Bot config updated"
        );
        self.persist_config(&next);
        Ok(next)
    }

    /// Records the spot seen by the loop.
    pub(crate) fn record_spot(&self, spot: f64) {
        self.config.write().last_spot = Some(spot);
    }

    /// Stamps an entry for the cooldown and persists the bookkeeping only,
    /// so settings written to the file by another process survive.
    pub(crate) fn record_entry(&self, now_ms: i64) {
        let _saving = self.save_lock.lock();
        let snapshot = {
            let mut config = self.config.write();
            config.last_action_ms = now_ms;
            config.clone()
        };
        match self.bot_store.save_bookkeeping(&snapshot) {
            Ok(written) => {
                self.config_degraded.store(false, Ordering::Relaxed);
                if written != snapshot {
                    tracing::warn!(
                        enabled = written.enabled,
                        auto_entry = written.auto_entry,
                        "Bot config file differs from the running config; restart to apply it"
                    );
                }
            }
            Err(e) => {
                self.config_degraded.store(true, Ordering::Relaxed);
                tracing::error!(error = %e, "Bot config save failed, keeping in-memory config");
            }
        }
    }

    #[must_use]
    pub fn config_degraded(&self) -> bool {
        self.config_degraded.load(Ordering::Relaxed)
    }

    fn persist_config(&self, config: &BotConfig) {
        match self.bot_store.save(config) {
            Ok(()) => self.config_degraded.store(false, Ordering::Relaxed),
            Err(e) => {
                self.config_degraded.store(true, Ordering::Relaxed);
                tracing::error!(error = %e, "Bot config save failed, keeping in-memory config");
            }
        }
    }
}
