//! Bearer credential issuance and verification.
//!
//! Credentials are stateless HMAC-signed JWTs carrying the subject and an
//! expiry. Verification needs only the shared secret.

use crate::error::{AuthError, AuthResult};
use certfolio_core::config::{AuthConfig, MIN_SECRET_KEY_BYTES, TokenAlgorithm};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Duration, OffsetDateTime};

/// Token type reported to clients.
pub const TOKEN_TYPE: &str = "bearer";

/// Claims carried by a bearer credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the admin identity.
    pub sub: String,
    /// Expiry as unix seconds.
    pub exp: u64,
    /// Issue time as unix seconds.
    pub iat: u64,
}

/// A freshly issued credential.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in_minutes: u64,
}

impl IssuedToken {
    /// Lifetime in seconds.
    pub fn expires_in_secs(&self) -> u64 {
        self.expires_in_minutes.saturating_mul(60)
    }
}

/// Issues and verifies bearer credentials with a symmetric secret.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    expire_minutes: u64,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &self.algorithm)
            .field("expire_minutes", &self.expire_minutes)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenSigner {
    /// Create a signer. The secret must be at least 32 bytes.
    pub fn new(secret: &[u8], algorithm: TokenAlgorithm, expire_minutes: u64) -> AuthResult<Self> {
        if secret.len() < MIN_SECRET_KEY_BYTES {
            return Err(AuthError::WeakSecret {
                min: MIN_SECRET_KEY_BYTES,
            });
        }
        let algorithm = match algorithm {
            TokenAlgorithm::HS256 => Algorithm::HS256,
            TokenAlgorithm::HS384 => Algorithm::HS384,
            TokenAlgorithm::HS512 => Algorithm::HS512,
        };
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm,
            expire_minutes,
        })
    }

    /// Create a signer from the auth configuration section.
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        Self::new(
            config.secret_key.as_bytes(),
            config.algorithm,
            config.access_token_expire_minutes,
        )
    }

    /// Issue a credential for `subject` expiring after the configured lifetime.
    pub fn issue(&self, subject: &str) -> AuthResult<IssuedToken> {
        self.issue_at(subject, OffsetDateTime::now_utc())
    }

    /// Issue a credential as if the current time were `now`.
    pub fn issue_at(&self, subject: &str, now: OffsetDateTime) -> AuthResult<IssuedToken> {
        let minutes = i64::try_from(self.expire_minutes)
            .map_err(|_| AuthError::Signing("token lifetime overflows".to_string()))?;
        let expires_at = now
            .checked_add(Duration::minutes(minutes))
            .ok_or_else(|| AuthError::Signing("token expiry overflows".to_string()))?;

        let claims = Claims {
            sub: subject.to_string(),
            exp: unix_secs(expires_at)?,
            iat: unix_secs(now)?,
        };
        let access_token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            access_token,
            token_type: TOKEN_TYPE,
            expires_in_minutes: self.expire_minutes,
        })
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

fn unix_secs(ts: OffsetDateTime) -> AuthResult<u64> {
    u64::try_from(ts.unix_timestamp())
        .map_err(|_| AuthError::Signing("timestamp before unix epoch".to_string()))
}
