use crate::types::SpotSource;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub deribit: DeribitConfig,
    pub storage: StorageConfig,
    pub analytics: AnalyticsConfig,
    pub control: ControlConfig,
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeribitConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub requests_per_second: u32,
    /// Nearest-to-spot instruments kept per chain fetch.
    pub max_instruments: usize,
    /// Concurrent ticker requests per chain fetch.
    pub fetch_concurrency: usize,
}

impl Default for DeribitConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.deribit.com/api/v2".to_string(),
            timeout_secs: 6,
            requests_per_second: 20,
            max_instruments: 160,
            fetch_concurrency: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub ledger_path: String,
    pub bot_config_path: String,
    pub history_cap: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: "data/paper_ledger.json".to_string(),
            bot_config_path: "data/bot_config.json".to_string(),
            history_cap: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Normaliser applied to every exposure value; ordering is unaffected.
    pub gex_scale: f64,
    pub walls_cache_ttl_secs: u64,
    pub max_combine_expiries: usize,
    /// Wall count for single-expiry chain snapshots.
    pub chain_walls_n: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            gex_scale: 1e-6,
            walls_cache_ttl_secs: 20,
            max_combine_expiries: 8,
            chain_walls_n: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub tick_interval_ms: u64,
    /// Upper bound for any single collaborator call made by the loop.
    pub fetch_timeout_ms: u64,
    /// Tick reports kept for the decision audit.
    pub audit_len: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2000,
            fetch_timeout_ms: 8000,
            audit_len: 200,
        }
    }
}

/// Paper-trading bot settings shared by request handlers and the control loop.
///
/// `last_spot` and `last_action_ms` are bookkeeping written only by the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub enabled: bool,
    pub auto_entry: bool,
    pub currency: String,
    pub expiries: Vec<String>,
    pub strike_range_pct: f64,
    pub walls_n: usize,
    /// Underlying move (percent, absolute) that takes profit.
    pub tp_move_pct: f64,
    /// Position P&L percent at or below which the position is stopped out.
    pub sl_pnl_pct: f64,
    pub max_positions: usize,
    pub max_risk_usd: Decimal,
    /// Contracts per leg; zero selects the venue minimum lot.
    pub qty: Decimal,
    pub spot_source: SpotSource,
    pub cooldown_sec: u64,
    pub last_spot: Option<f64>,
    pub last_action_ms: i64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_entry: false,
            currency: "BTC".to_string(),
            expiries: Vec::new(),
            strike_range_pct: 8.0,
            walls_n: 18,
            tp_move_pct: 1.5,
            sl_pnl_pct: -60.0,
            max_positions: 3,
            max_risk_usd: Decimal::from(500),
            qty: Decimal::ZERO,
            spot_source: SpotSource::Index,
            cooldown_sec: 15,
            last_spot: None,
            last_action_ms: 0,
        }
    }
}

impl BotConfig {
    /// True once `cooldown_sec` has elapsed since the last entry.
    #[must_use]
    pub fn can_act(&self, now_ms: i64) -> bool {
        let cooldown_ms = i64::try_from(self.cooldown_sec.saturating_mul(1000)).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.last_action_ms) >= cooldown_ms
    }

    /// Remaining cooldown in milliseconds, zero when entries are allowed.
    #[must_use]
    pub fn cooldown_remaining_ms(&self, now_ms: i64) -> i64 {
        let cooldown_ms = i64::try_from(self.cooldown_sec.saturating_mul(1000)).unwrap_or(i64::MAX);
        cooldown_ms
            .saturating_sub(now_ms.saturating_sub(self.last_action_ms))
            .max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_desk_conventions() {
        let config = AppConfig::default();
        assert!((config.analytics.gex_scale - 1e-6).abs() < f64::EPSILON);
        assert_eq!(config.analytics.walls_cache_ttl_secs, 20);
        assert_eq!(config.analytics.max_combine_expiries, 8);
        assert_eq!(config.storage.history_cap, 2000);
        assert_eq!(config.control.tick_interval_ms, 2000);
        assert!(!config.bot.enabled);
        assert_eq!(config.bot.cooldown_sec, 15);
    }

    #[test]
    fn cooldown_gate() {
        let bot = BotConfig {
            cooldown_sec: 15,
            last_action_ms: 1_000_000,
            ..BotConfig::default()
        };
        assert!(!bot.can_act(1_000_000 + 14_999));
        assert!(bot.can_act(1_000_000 + 15_000));
        assert_eq!(bot.cooldown_remaining_ms(1_000_000 + 5_000), 10_000);
        assert_eq!(bot.cooldown_remaining_ms(1_000_000 + 20_000), 0);
    }

    #[test]
    fn cooldown_saturates_on_extreme_values() {
        let bot = BotConfig {
            cooldown_sec: u64::MAX,
            last_action_ms: i64::MAX,
            ..BotConfig::default()
        };
        assert!(!bot.can_act(i64::MIN));
        assert_eq!(bot.cooldown_remaining_ms(i64::MIN), i64::MAX);
    }

    #[test]
    fn partial_bot_json_fills_defaults() {
        let bot: BotConfig = serde_json::from_str(r#"{"enabled":true,"cooldown_sec":30}"#).unwrap();
        assert!(bot.enabled);
        assert_eq!(bot.cooldown_sec, 30);
        assert_eq!(bot.currency, "BTC");
        assert_eq!(bot.walls_n, 18);
    }
}
