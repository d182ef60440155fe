//! Flexible certificate date parsing.
//!
//! Certificate dates arrive as free-form strings from multipart forms and
//! JSON bodies. Two shapes are accepted, tried in order:
//!
//! 1. A calendar date `YYYY-MM-DD`, interpreted as midnight UTC.
//! 2. A full ISO-8601 timestamp: RFC 3339 with an offset (normalized to UTC),
//!    or a naive `YYYY-MM-DDTHH:MM[:SS[.fraction]]` interpreted as UTC.
//!
//! Both shapes need a plain four-digit year in `1..=9999`; signed or
//! out-of-range years are rejected. Anything else fails with
//! [`Error::InvalidDate`].

use crate::error::{Error, Result};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Parse a certificate date from either of the two accepted input shapes.
pub fn parse_flexible_date(input: &str) -> Result<OffsetDateTime> {
    let value = input.trim();
    if !has_plain_year(value) {
        return Err(Error::InvalidDate(input.to_string()));
    }

    parse_calendar_date(value)
        .map(|date| date.midnight().assume_utc())
        .or_else(|| parse_timestamp(value))
        .filter(|ts| SUPPORTED_YEARS.contains(&ts.year()))
        .ok_or_else(|| Error::InvalidDate(input.to_string()))
}

/// Years the metadata store can encode.
const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// `YYYY-` prefix with no sign; `[year]` alone would accept `-0001` or `+2023`.
fn has_plain_year(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() > 4 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-'
}

fn parse_calendar_date(value: &str) -> Option<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).ok()
}

fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    // ISO-8601 permits a space in place of the `T` separator.
    let normalized = if value.len() > 10 && value.as_bytes()[10] == b' ' {
        let mut owned = value.to_string();
        owned.replace_range(10..11, "T");
        owned
    } else {
        value.to_string()
    };

    if let Ok(ts) = OffsetDateTime::parse(&normalized, &Rfc3339) {
        return ts.checked_to_offset(UtcOffset::UTC);
    }

    let naive_formats = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    naive_formats
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(&normalized, format).ok())
        .map(PrimitiveDateTime::assume_utc)
}

/// Format a timestamp as RFC 3339 for API responses.
pub fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
    ts.format(&Rfc3339)
        .map_err(|e| Error::Serialization(format!("failed to format timestamp: {e}")))
}

/// Reject an expiry that precedes the issue date.
pub fn ensure_date_order(issue: OffsetDateTime, expiry: Option<OffsetDateTime>) -> Result<()> {
    match expiry {
        Some(expiry) if expiry < issue => Err(Error::InvalidDateRange {
            issue: format_timestamp(issue)?,
            expiry: format_timestamp(expiry)?,
        }),
        _ => Ok(()),
    }
}
