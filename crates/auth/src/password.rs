//! One-way password hashing.
//!
//! Hashes are PBKDF2-HMAC-SHA256 in PHC string form:
//! `$pbkdf2-sha256$i=<iterations>$<salt>$<hash>`, with salt and hash in
//! unpadded standard base64. Verification reads the iteration count from the
//! stored string, so raising the default does not invalidate old hashes.

use crate::error::{AuthError, AuthResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

const SCHEME: &str = "pbkdf2-sha256";
const ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const SALT_LEN: usize = 16;
const MIN_SALT_LEN: usize = 8;
const HASH_LEN: usize = 32;

/// Iterations used for newly created hashes.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Lowest iteration count accepted when hashing or decoding.
pub const MIN_ITERATIONS: u32 = 10_000;

/// A pluggable one-way password hash with verification.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into its encoded form.
    fn hash(&self, password: &str) -> AuthResult<String>;

    /// Check a plaintext password against an encoded hash.
    ///
    /// Returns `Ok(false)` on mismatch and `Err` only when the stored hash
    /// cannot be decoded.
    fn verify(&self, password: &str, encoded: &str) -> AuthResult<bool>;
}

/// PBKDF2-HMAC-SHA256 password hasher backed by `ring`.
#[derive(Clone, Copy, Debug)]
pub struct Pbkdf2PasswordHasher {
    iterations: NonZeroU32,
}

impl Default for Pbkdf2PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Pbkdf2PasswordHasher {
    pub fn new() -> Self {
        Self {
            iterations: NonZeroU32::MIN.saturating_add(DEFAULT_ITERATIONS - 1),
        }
    }

    /// Hasher with a custom work factor, at least [`MIN_ITERATIONS`].
    pub fn with_iterations(iterations: u32) -> AuthResult<Self> {
        Ok(Self {
            iterations: checked_iterations(iterations)?,
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// Check that `encoded` is in the format this hasher produces.
    pub fn check_format(encoded: &str) -> AuthResult<()> {
        decode(encoded).map(|_| ())
    }
}

impl PasswordHasher for Pbkdf2PasswordHasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        let mut salt = [0u8; SALT_LEN];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| AuthError::Hashing("failed to generate salt".to_string()))?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(
            ALGORITHM,
            self.iterations,
            &salt,
            password.as_bytes(),
            &mut hash,
        );

        Ok(format!(
            "${SCHEME}$i={}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash)
        ))
    }

    fn verify(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let decoded = decode(encoded)?;
        Ok(pbkdf2::verify(
            ALGORITHM,
            decoded.iterations,
            &decoded.salt,
            password.as_bytes(),
            &decoded.hash,
        )
        .is_ok())
    }
}

struct DecodedHash {
    iterations: NonZeroU32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

fn checked_iterations(iterations: u32) -> AuthResult<NonZeroU32> {
    match NonZeroU32::new(iterations) {
        Some(n) if iterations >= MIN_ITERATIONS => Ok(n),
        _ => Err(AuthError::MalformedHash(format!(
            "iteration count must be at least {MIN_ITERATIONS}, got {iterations}"
        ))),
    }
}

fn decode(encoded: &str) -> AuthResult<DecodedHash> {
    let mut parts = encoded.trim().split('$');
    let (Some(""), Some(scheme), Some(params), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(AuthError::MalformedHash(format!(
            "expected '${SCHEME}$i=<iterations>$<salt>$<hash>'"
        )));
    };
    if scheme != SCHEME {
        return Err(AuthError::MalformedHash(format!(
            "unsupported scheme '{scheme}'"
        )));
    }

    let iterations = params
        .strip_prefix("i=")
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(|| AuthError::MalformedHash(format!("invalid parameters '{params}'")))?;
    let iterations = checked_iterations(iterations)?;

    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|e| AuthError::MalformedHash(format!("salt: {e}")))?;
    if salt.len() < MIN_SALT_LEN {
        return Err(AuthError::MalformedHash(format!(
            "salt must be at least {MIN_SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }

    let hash = STANDARD_NO_PAD
        .decode(hash)
        .map_err(|e| AuthError::MalformedHash(format!("hash: {e}")))?;
    if hash.len() != HASH_LEN {
        return Err(AuthError::MalformedHash(format!(
            "hash must be {HASH_LEN} bytes, got {}",
            hash.len()
        )));
    }

    Ok(DecodedHash {
        iterations,
        salt,
        hash,
    })
}
