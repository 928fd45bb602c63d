//! Deribit v2 wire types.
//!
//! Only the fields the desk reads are modelled; everything else in the
//! venue payloads is ignored.

use gex_desk_core::{LegQuote, OptionType};
use serde::Deserialize;

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// One listed option from `/public/get_instruments`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Instrument {
    pub instrument_name: String,
    #[serde(default)]
    pub strike: Option<f64>,
    #[serde(default)]
    pub option_type: Option<String>,
    #[serde(default)]
    pub expiration_timestamp: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl Instrument {
    #[must_use]
    pub fn option_type(&self) -> OptionType {
        OptionType::parse(self.option_type.as_deref().unwrap_or_default())
    }

    #[must_use]
    pub fn strike(&self) -> f64 {
        self.strike.filter(|s| s.is_finite()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Greeks {
    #[serde(default)]
    pub gamma: Option<f64>,
}

/// `/public/ticker` payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Ticker {
    pub instrument_name: String,
    #[serde(default)]
    pub best_bid_price: Option<f64>,
    #[serde(default)]
    pub best_ask_price: Option<f64>,
    #[serde(default)]
    pub mark_price: Option<f64>,
    #[serde(default)]
    pub mark_iv: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub underlying_price: Option<f64>,
    #[serde(default)]
    pub index_price: Option<f64>,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub greeks: Option<Greeks>,
}

impl Ticker {
    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.greeks.as_ref().and_then(|g| g.gamma).unwrap_or(0.0)
    }

    /// Leg quote; missing sides read as zero.
    #[must_use]
    pub fn to_leg_quote(&self) -> LegQuote {
        LegQuote {
            instrument_name: self.instrument_name.clone(),
            bid_price: self.best_bid_price.unwrap_or(0.0),
            ask_price: self.best_ask_price.unwrap_or(0.0),
            mark_price: self.mark_price.unwrap_or(0.0),
            underlying_price: self
                .underlying_price
                .or(self.index_price)
                .unwrap_or(0.0),
        }
    }
}

/// `/public/get_index_price` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexPrice {
    pub index_price: f64,
}
