//! Auth error types.

use thiserror::Error;

/// Credential operation errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("malformed password hash: {0}")]
    MalformedHash(String),

    #[error("signing secret must be at least {min} bytes")]
    WeakSecret { min: usize },

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("signing error: {0}")]
    Signing(String),
}

/// Result type for credential operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;
