mod analytics;
mod bot;
mod positions;
mod run;

pub use analytics::{chain, expiries, expiry_mode, walls, ChainArgs};
pub use bot::{bot, BotAction};
pub use positions::positions;
pub use run::run;

use gex_desk_bot::Desk;
use gex_desk_core::{AppConfig, MarketData};
use gex_desk_deribit::{DeribitClient, DeribitClientConfig};
use std::sync::Arc;

/// Desk backed by the live Deribit client and the configured data files.
pub(crate) fn open_desk(config: &AppConfig) -> anyhow::Result<Desk> {
    let client = DeribitClient::new(DeribitClientConfig::from_settings(&config.deribit))?;
    let market: Arc<dyn MarketData> = Arc::new(client);
    Ok(Desk::from_config(config, market)?)
}
