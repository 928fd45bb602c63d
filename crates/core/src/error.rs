//! Error types shared by the desk crates.
//!
//! Every core operation returns a typed [`DeskError`] instead of swallowing
//! failures. Callers decide whether a failure is fatal; the control loop
//! treats all of them as "skip this tick".

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by analytics, the position ledger and the control loop.
#[derive(Debug, Error)]
pub enum DeskError {
    /// Market-data collaborator failed or timed out.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// An open position already exists for this market key.
    #[error("conflict: position already open for {currency} {expiry} {strike}")]
    Conflict {
        /// Currency of the conflicting key.
        currency: String,
        /// Expiry code of the conflicting key.
        expiry: String,
        /// Strike of the conflicting key.
        strike: Decimal,
    },

    /// No open position with the given id.
    #[error("position not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// Durable storage could not be read or written.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Caller supplied an invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DeskError {
    /// Creates a collaborator error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable(message.into())
    }

    /// Creates a conflict error for a (currency, expiry, strike) key.
    pub fn conflict(currency: impl Into<String>, expiry: impl Into<String>, strike: Decimal) -> Self {
        Self::Conflict {
            currency: currency.into(),
            expiry: expiry.into(),
            strike,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Creates an invalid request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

impl From<tokio::time::error::Elapsed> for DeskError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::CollaboratorUnavailable(format!("timeout: {err}"))
    }
}

/// Result type alias for desk operations.
pub type Result<T> = std::result::Result<T, DeskError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_conflict_error_names_the_key() {
        let err = DeskError::conflict("BTC", "28MAR25", dec!(70000));
        let display = err.to_string();
        assert!(display.contains("BTC"));
        assert!(display.contains("28MAR25"));
        assert!(display.contains("70000"));
        assert!(matches!(err, DeskError::Conflict { .. }));
    }

    #[test]
    fn test_not_found_error() {
        let err = DeskError::not_found("abc-123");
        assert!(err.to_string().contains("abc-123"));
        assert!(matches!(err, DeskError::NotFound { .. }));
    }

    #[test]
    fn test_collaborator_error_display() {
        let err = DeskError::unavailable("connection refused");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_invalid_request_display() {
        let err = DeskError::invalid("quantity must be positive");
        assert!(matches!(err, DeskError::InvalidRequest(_)));
        assert!(err.to_string().contains("quantity"));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_collaborator_unavailable() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        let err: DeskError = elapsed.into();
        assert!(matches!(err, DeskError::CollaboratorUnavailable(_)));
    }
}
