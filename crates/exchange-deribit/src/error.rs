//! Error types for the Deribit market-data client.

use gex_desk_core::DeskError;
use thiserror::Error;

/// Errors that can occur when talking to Deribit.
#[derive(Debug, Error)]
pub enum DeribitError {
    /// JSON-RPC error object returned by the venue.
    #[error("API error {code}: {message}")]
    Api {
        /// Deribit error code.
        code: i64,
        message: String,
    },

    /// Non-success HTTP status without a JSON-RPC error body.
    #[error("HTTP {status_code}: {message}")]
    Http { status_code: u16, message: String },

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout: {0}")]
    Timeout(String),

    /// Instrument name that cannot be sent to the venue.
    #[error("invalid instrument: {0}")]
    InvalidInstrument(String),

    /// Envelope carried neither `result` nor `error`.
    #[error("empty result from {0}")]
    EmptyResult(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Deribit's JSON-RPC code for request throttling.
pub const TOO_MANY_REQUESTS: i64 = 10028;

impl DeribitError {
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        if code == TOO_MANY_REQUESTS {
            return Self::RateLimit { retry_after_secs: 1 };
        }
        Self::Api {
            code,
            message: message.into(),
        }
    }

    pub fn http(status_code: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status_code,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for DeribitError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DeribitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Every venue failure is a collaborator failure to the desk.
impl From<DeribitError> for DeskError {
    fn from(err: DeribitError) -> Self {
        match err {
            DeribitError::InvalidInstrument(name) => DeskError::invalid(format!("invalid instrument: {name}")),
            other => DeskError::unavailable(format!("deribit: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeribitError>;
