//! Market snapshot types produced by market-data collaborators.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option right as reported by the venue.
///
/// Anything that is not recognisably a call is kept as [`OptionType::Other`]
/// and carries the put sign in exposure calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
    #[serde(other)]
    Other,
}

impl OptionType {
    /// Parses venue spellings (`call`, `C`, `put`, `P`); unknown input maps to `Other`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Self::Call,
            "put" | "p" => Self::Put,
            _ => Self::Other,
        }
    }

    /// Dealer-gamma sign: +1 for calls, -1 for puts and unknown types.
    #[must_use]
    pub const fn gex_sign(self) -> f64 {
        match self {
            Self::Call => 1.0,
            Self::Put | Self::Other => -1.0,
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One option instrument's snapshot.
///
/// Prices are quoted in units of the underlying; multiply by spot for USD.
/// `ask >= bid` is not guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuoteRow {
    pub instrument_name: String,
    pub strike: Decimal,
    pub option_type: OptionType,
    pub open_interest: f64,
    pub gamma: f64,
    pub bid_price: f64,
    pub ask_price: f64,
    #[serde(default)]
    pub mark_price: f64,
    pub mark_iv: f64,
    pub underlying_price: f64,
    pub expiry: String,
}

/// Live quote for a single option leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegQuote {
    pub instrument_name: String,
    pub bid_price: f64,
    pub ask_price: f64,
    pub mark_price: f64,
    pub underlying_price: f64,
}

impl From<&OptionQuoteRow> for LegQuote {
    fn from(row: &OptionQuoteRow) -> Self {
        Self {
            instrument_name: row.instrument_name.clone(),
            bid_price: row.bid_price,
            ask_price: row.ask_price,
            mark_price: row.mark_price,
            underlying_price: row.underlying_price,
        }
    }
}

/// Which price the desk treats as "spot".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotSource {
    /// Venue index price.
    #[default]
    Index,
    /// Last traded price of the perpetual.
    Last,
}

impl std::fmt::Display for SpotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Last => write!(f, "last"),
        }
    }
}

impl std::str::FromStr for SpotSource {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "index" => Ok(Self::Index),
            "last" => Ok(Self::Last),
            other => Err(format!("unknown spot source {other:?}, expected index or last")),
        }
    }
}

/// Expiry filter for a chain fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirySelector {
    All,
    Code(String),
}

impl ExpirySelector {
    /// Returns true if a row with expiry `code` passes this filter.
    #[must_use]
    pub fn matches(&self, code: &str) -> bool {
        match self {
            Self::All => true,
            Self::Code(expected) => expected.eq_ignore_ascii_case(code),
        }
    }
}

impl std::fmt::Display for ExpirySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Code(code) => write!(f, "{code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_type_parses_venue_spellings() {
        assert_eq!(OptionType::parse("call"), OptionType::Call);
        assert_eq!(OptionType::parse("C"), OptionType::Call);
        assert_eq!(OptionType::parse(" Put "), OptionType::Put);
        assert_eq!(OptionType::parse("straddle?"), OptionType::Other);
        assert_eq!(OptionType::parse(""), OptionType::Other);
    }

    #[test]
    fn unknown_option_type_uses_put_sign() {
        assert!((OptionType::Call.gex_sign() - 1.0).abs() < f64::EPSILON);
        assert!((OptionType::Put.gex_sign() + 1.0).abs() < f64::EPSILON);
        assert!((OptionType::Other.gex_sign() + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn garbled_option_type_deserializes_as_other() {
        let parsed: OptionType = serde_json::from_str("\"weird\"").unwrap();
        assert_eq!(parsed, OptionType::Other);
    }

    #[test]
    fn expiry_selector_matching() {
        assert!(ExpirySelector::All.matches("28MAR25"));
        assert!(ExpirySelector::Code("28MAR25".into()).matches("28mar25"));
        assert!(!ExpirySelector::Code("28MAR25".into()).matches("4APR25"));
    }
}
