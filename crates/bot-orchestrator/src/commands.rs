use crate::events::{BlockReason, TickReport};
use chrono::{DateTime, Utc};
use gex_desk_core::{BotConfig, DeskError, Result, SpotSource};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// One week.
pub const MAX_COOLDOWN_SEC: u64 = 7 * 24 * 60 * 60;

#[derive(Debug)]
pub enum BotCommand {
    /// Run one tick immediately and reply with its report.
    TickNow(oneshot::Sender<TickReport>),
    GetStatus(oneshot::Sender<BotStatus>),
    Shutdown,
}

/// Partial update of the bot configuration.
///
/// Loop bookkeeping (`last_spot`, `last_action_ms`) is not part of the patch
/// and unknown fields are rejected, so a patch can never touch it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfigPatch {
    pub enabled: Option<bool>,
    pub auto_entry: Option<bool>,
    pub currency: Option<String>,
    pub expiries: Option<Vec<String>>,
    pub strike_range_pct: Option<f64>,
    pub walls_n: Option<usize>,
    pub tp_move_pct: Option<f64>,
    pub sl_pnl_pct: Option<f64>,
    pub max_positions: Option<usize>,
    pub max_risk_usd: Option<Decimal>,
    pub qty: Option<Decimal>,
    pub spot_source: Option<SpotSource>,
    pub cooldown_sec: Option<u64>,
}

impl BotConfigPatch {
    /// Applies the patch to a copy of `current`, validating the result.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` naming the first offending field; `current` is not
    /// modified in that case.
    pub fn apply(&self, current: &BotConfig) -> Result<BotConfig> {
        let mut next = current.clone();

        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(auto_entry) = self.auto_entry {
            next.auto_entry = auto_entry;
        }
        if let Some(currency) = &self.currency {
            let currency = currency.trim().to_ascii_uppercase();
            if currency.is_empty() || !currency.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(DeskError::invalid("currency must be a non-empty alphanumeric code"));
            }
            next.currency = currency;
        }
        if let Some(expiries) = &self.expiries {
            let mut out: Vec<String> = Vec::with_capacity(expiries.len());
            for code in expiries {
                let code = code.trim().to_ascii_uppercase();
                if !code.is_empty() && !out.contains(&code) {
                    out.push(code);
                }
            }
            next.expiries = out;
        }
        if let Some(pct) = self.strike_range_pct {
            if !(pct.is_finite() && pct > 0.0 && pct <= 100.0) {
                return Err(DeskError::invalid("strike_range_pct must be in (0, 100]"));
            }
            next.strike_range_pct = pct;
        }
        if let Some(n) = self.walls_n {
            if n == 0 || n > 200 {
                return Err(DeskError::invalid("walls_n must be in 1..=200"));
            }
            next.walls_n = n;
        }
        if let Some(tp) = self.tp_move_pct {
            if !(tp.is_finite() && tp > 0.0) {
                return Err(DeskError::invalid("tp_move_pct must be positive"));
            }
            next.tp_move_pct = tp;
        }
        if let Some(sl) = self.sl_pnl_pct {
            if !(sl.is_finite() && (-100.0..=0.0).contains(&sl)) {
                return Err(DeskError::invalid("sl_pnl_pct must be in [-100, 0]"));
            }
            next.sl_pnl_pct = sl;
        }
        if let Some(max_positions) = self.max_positions {
            next.max_positions = max_positions;
        }
        if let Some(max_risk) = self.max_risk_usd {
            if max_risk < Decimal::ZERO {
                return Err(DeskError::invalid("max_risk_usd must not be negative"));
            }
            next.max_risk_usd = max_risk;
        }
        if let Some(qty) = self.qty {
            if qty < Decimal::ZERO {
                return Err(DeskError::invalid("qty must not be negative"));
            }
            next.qty = qty;
        }
        if let Some(source) = self.spot_source {
            next.spot_source = source;
        }
        if let Some(cooldown) = self.cooldown_sec {
            if cooldown > MAX_COOLDOWN_SEC {
                return Err(DeskError::invalid(format!(
                    "cooldown_sec must be at most {MAX_COOLDOWN_SEC}"
                )));
            }
            next.cooldown_sec = cooldown;
        }

        Ok(next)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// No control loop task exists.
    NotStarted,
    Running,
    Stopped,
}

/// Snapshot of the control loop, published after every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatus {
    pub state: LoopState,
    pub enabled: bool,
    pub auto_entry: bool,
    pub currency: String,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_spot: Option<f64>,
    pub last_block: Option<BlockReason>,
    pub last_entry_id: Option<String>,
    pub open_positions: usize,
    pub cooldown_remaining_ms: i64,
    /// Ledger writes are failing; state is held in memory only.
    pub ledger_degraded: bool,
    pub last_error: Option<String>,
}

impl BotStatus {
    #[must_use]
    pub fn idle(config: &BotConfig, open_positions: usize, ledger_degraded: bool) -> Self {
        Self {
            state: LoopState::NotStarted,
            enabled: config.enabled,
            auto_entry: config.auto_entry,
            currency: config.currency.clone(),
            ticks: 0,
            last_tick_at: None,
            last_spot: config.last_spot,
            last_block: None,
            last_entry_id: None,
            open_positions,
            cooldown_remaining_ms: config.cooldown_remaining_ms(Utc::now().timestamp_millis()),
            ledger_degraded,
            last_error: None,
        }
    }
}
