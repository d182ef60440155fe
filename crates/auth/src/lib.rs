//! Credential primitives for the certfolio backend.
//!
//! This crate provides:
//! - One-way password hashing with PBKDF2-HMAC-SHA256
//! - Signed, time-bounded bearer credentials (JWT)

pub mod error;
pub mod password;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use password::{PasswordHasher, Pbkdf2PasswordHasher};
pub use token::{Claims, IssuedToken, TokenSigner};
