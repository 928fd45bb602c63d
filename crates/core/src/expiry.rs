//! Deribit expiry codes (`9FEB26`, `28MAR25`) and days-to-expiry.

use chrono::NaiveDate;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Parses an expiry code into a calendar date.
///
/// The day may have one or two digits; two-digit years are in the 2000s.
#[must_use]
pub fn parse_expiry_code(code: &str) -> Option<NaiveDate> {
    let s = code.trim().to_ascii_uppercase();
    if !s.is_ascii() {
        return None;
    }

    let month_pos = (1..=2).find(|&i| {
        s.len() >= i + 3 && MONTHS.contains(&&s[i..i + 3])
    })?;

    let day: u32 = s[..month_pos].parse().ok()?;
    let month = MONTHS.iter().position(|m| *m == &s[month_pos..month_pos + 3])? as u32 + 1;
    let mut year: i32 = s[month_pos + 3..].parse().ok()?;
    if year < 100 {
        year += 2000;
    }

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Days from `today` until the expiry date; negative once expired.
#[must_use]
pub fn days_to_expiry(code: &str, today: NaiveDate) -> Option<i64> {
    parse_expiry_code(code).map(|date| (date - today).num_days())
}

/// Sorts codes chronologically; unparseable codes go last in lexical order.
pub fn sort_expiry_codes(codes: &mut [String]) {
    codes.sort_by(|a, b| {
        match (parse_expiry_code(a), parse_expiry_code(b)) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    });
}

/// Extracts the expiry code from an instrument name like `BTC-28MAR25-70000-C`.
#[must_use]
pub fn expiry_from_instrument(name: &str) -> Option<&str> {
    let mut parts = name.split('-');
    let _underlying = parts.next()?;
    let expiry = parts.next()?;
    parts.next()?;
    Some(expiry)
}
