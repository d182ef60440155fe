//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid date '{0}': use YYYY-MM-DD or an ISO-8601 timestamp")]
    InvalidDate(String),

    #[error("expiry_date ({expiry}) cannot be earlier than issue_date ({issue})")]
    InvalidDateRange { issue: String, expiry: String },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
