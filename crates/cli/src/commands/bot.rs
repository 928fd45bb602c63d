use clap::Subcommand;
use gex_desk_bot::{BotConfigPatch, BotConfigStore};
use gex_desk_core::{AppConfig, SpotSource};
use rust_decimal::Decimal;

#[derive(Subcommand)]
pub enum BotAction {
    /// Print the effective bot configuration
    Show,
    /// Patch the persisted bot configuration
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        auto_entry: Option<bool>,
        #[arg(long)]
        currency: Option<String>,
        /// Expiry codes, comma separated
        #[arg(long, value_delimiter = ',')]
        expiries: Option<Vec<String>>,
        #[arg(long)]
        strike_range_pct: Option<f64>,
        #[arg(long)]
        walls_n: Option<usize>,
        #[arg(long)]
        tp_move_pct: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        sl_pnl_pct: Option<f64>,
        #[arg(long)]
        max_positions: Option<usize>,
        #[arg(long)]
        max_risk_usd: Option<Decimal>,
        #[arg(long)]
        qty: Option<Decimal>,
        #[arg(long)]
        spot_source: Option<SpotSource>,
        #[arg(long)]
        cooldown_sec: Option<u64>,
    },
}

pub fn bot(config: &AppConfig, action: BotAction) -> anyhow::Result<()> {
    let store = BotConfigStore::new(&config.storage.bot_config_path);
    let current = store.load()?.unwrap_or_else(|| config.bot.clone());

    match action {
        BotAction::Show => {
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        BotAction::Set {
            enabled,
            auto_entry,
            currency,
            expiries,
            strike_range_pct,
            walls_n,
            tp_move_pct,
            sl_pnl_pct,
            max_positions,
            max_risk_usd,
            qty,
            spot_source,
            cooldown_sec,
        } => {
            let patch = BotConfigPatch {
                enabled,
                auto_entry,
                currency,
                expiries,
                strike_range_pct,
                walls_n,
                tp_move_pct,
                sl_pnl_pct,
                max_positions,
                max_risk_usd,
                qty,
                spot_source,
                cooldown_sec,
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to change; pass at least one option");
            }
            let next = patch.apply(&current)?;
            store.save(&next)?;
            tracing::info!(path = %config.storage.bot_config_path, "Bot config saved");
            tracing::warn!("A running `gex-desk run` keeps its loaded config; restart it to apply these changes");
            println!("{}", serde_json::to_string_pretty(&next)?);
        }
    }
    Ok(())
}
