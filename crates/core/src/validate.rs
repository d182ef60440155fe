//! Field validation for certificate metadata and admin identities.

use crate::error::{Error, Result};
use url::Url;

/// Minimum length of a trimmed title or issuer.
pub const TEXT_MIN_CHARS: usize = 2;
/// Maximum length of a trimmed title or issuer.
pub const TEXT_MAX_CHARS: usize = 200;
/// Minimum admin username length.
pub const USERNAME_MIN_CHARS: usize = 3;
/// Maximum admin username length.
pub const USERNAME_MAX_CHARS: usize = 50;

fn bounded(field: &'static str, value: &str, min: usize, max: usize) -> Result<String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(Error::field(
            field,
            format!("must be between {min} and {max} characters (got {len})"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trim and length-check a certificate title.
pub fn title(value: &str) -> Result<String> {
    bounded("title", value, TEXT_MIN_CHARS, TEXT_MAX_CHARS)
}

/// Trim and length-check a certificate issuer.
pub fn issuer(value: &str) -> Result<String> {
    bounded("issuer", value, TEXT_MIN_CHARS, TEXT_MAX_CHARS)
}

/// Length-check an admin username. Usernames are not trimmed.
pub fn username(value: &str) -> Result<()> {
    let len = value.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&len) {
        return Err(Error::field(
            "username",
            format!(
                "must be between {USERNAME_MIN_CHARS} and {USERNAME_MAX_CHARS} characters"
            ),
        ));
    }
    Ok(())
}

/// Require an absolute http(s) URL. Returns the trimmed input unchanged otherwise.
pub fn verify_url(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let parsed =
        Url::parse(trimmed).map_err(|e| Error::field("verify_url", e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::field(
                "verify_url",
                format!("unsupported scheme '{other}', expected http or https"),
            ));
        }
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::field("verify_url", "missing host"));
    }
    Ok(trimmed.to_string())
}

/// Trim free text; empty after trimming means absent.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
