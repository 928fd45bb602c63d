pub mod cache;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod expiry;
pub mod traits;
pub mod types;

pub use cache::TtlCache;
pub use config::{AnalyticsConfig, AppConfig, BotConfig, ControlConfig, DeribitConfig, StorageConfig};
pub use config_loader::ConfigLoader;
pub use error::{DeskError, Result};
pub use expiry::{days_to_expiry, expiry_from_instrument, parse_expiry_code, sort_expiry_codes};
pub use traits::MarketData;
pub use types::{ExpirySelector, LegQuote, OptionQuoteRow, OptionType, SpotSource};
