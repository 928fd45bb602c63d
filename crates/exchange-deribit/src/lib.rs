//! Deribit public market data for the GEX desk.
//!
//! [`DeribitClient`] implements [`gex_desk_core::MarketData`] over the v2
//! REST API:
//!
//! - `GET /public/get_instruments` - listed options and expiry codes
//! - `GET /public/ticker` - quotes, open interest and greeks per instrument
//! - `GET /public/get_index_price` - index spot (`btc_usd`, `eth_usd`)
//!
//! Every request waits on a shared `governor` rate limiter.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DeribitClient, DeribitClientConfig, DERIBIT_PROD_URL, DERIBIT_TEST_URL};
pub use error::{DeribitError, Result};
pub use types::{Greeks, IndexPrice, Instrument, Ticker};
