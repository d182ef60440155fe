//! Auth gateway and request authentication middleware.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use certfolio_auth::{AuthError, IssuedToken, PasswordHasher, TokenSigner};
use certfolio_metadata::MetadataStore;
use certfolio_metadata::models::AdminRow;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Request/response header carrying the trace ID.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Message returned for any failed login.
pub const LOGIN_FAILED_MESSAGE: &str = "Incorrect username or password";

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is truncated to MAX_TRACE_ID_LEN characters and
    /// non-printable characters are removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verifies admin credentials and issues/validates bearer credentials.
pub struct AuthGateway {
    metadata: Arc<dyn MetadataStore>,
    hasher: Arc<dyn PasswordHasher>,
    signer: TokenSigner,
}

impl AuthGateway {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        hasher: Arc<dyn PasswordHasher>,
        signer: TokenSigner,
    ) -> Self {
        Self {
            metadata,
            hasher,
            signer,
        }
    }

    /// Check a username/password pair against the credential store.
    ///
    /// Unknown users, wrong passwords and undecodable stored hashes all
    /// yield the same 401.
    pub async fn authenticate(&self, username: &str, password: &str) -> ApiResult<AdminRow> {
        let result = self.check_credentials(username, password).await;
        metrics::record_login(result.is_ok());
        result
    }

    async fn check_credentials(&self, username: &str, password: &str) -> ApiResult<AdminRow> {
        let Some(admin) = self.metadata.get_admin_by_username(username).await? else {
            tracing::info!(username = %username, "Login failed: unknown user");
            return Err(ApiError::Unauthorized(LOGIN_FAILED_MESSAGE.to_string()));
        };

        // PBKDF2 is CPU-bound; keep it off the async workers.
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored = admin.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| ApiError::Internal(format!("password verification task failed: {e}")))?;

        match verified {
            Ok(true) => {
                tracing::info!(admin_id = admin.admin_id, "Login succeeded");
                Ok(admin)
            }
            Ok(false) => {
                tracing::info!(admin_id = admin.admin_id, "Login failed: wrong password");
                Err(ApiError::Unauthorized(LOGIN_FAILED_MESSAGE.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    admin_id = admin.admin_id,
                    error = %e,
                    "Stored password hash cannot be decoded"
                );
                Err(ApiError::Unauthorized(LOGIN_FAILED_MESSAGE.to_string()))
            }
        }
    }

    /// Issue a bearer credential for an authenticated identity.
    pub fn issue_token(&self, admin: &AdminRow) -> ApiResult<IssuedToken> {
        Ok(self.signer.issue(&admin.username)?)
    }

    /// Validate a bearer credential and re-fetch the identity it names.
    pub async fn resolve_current_user(&self, token: &str) -> ApiResult<AdminRow> {
        let claims = self.signer.verify(token)?;
        self.metadata
            .get_admin_by_username(&claims.sub)
            .await?
            .ok_or_else(|| ApiError::Auth(AuthError::InvalidToken("unknown subject".to_string())))
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub admin: AdminRow,
}

/// Why a presented bearer credential was not accepted.
///
/// Public routes ignore it; [`require_auth`] reports it.
#[derive(Clone, Debug)]
struct RejectedCredential(String);

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Resolves the bearer credential, if any, and sets up trace context.
///
/// A bad credential does not fail the request here, so public routes keep
/// working; protected handlers reject it via [`require_auth`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    let span = tracing::info_span!("request", trace_id = %trace_id_str);

    if let Some(token) = extract_bearer_token(&req).map(str::to_owned) {
        match state
            .gateway
            .resolve_current_user(&token)
            .instrument(span.clone())
            .await
        {
            Ok(admin) => {
                req.extensions_mut().insert(AuthenticatedUser { admin });
            }
            Err(e) => {
                let reason = span.in_scope(|| match e {
                    ApiError::Auth(AuthError::TokenExpired) => {
                        tracing::debug!("Bearer credential expired");
                        "token expired"
                    }
                    ApiError::Auth(e) => {
                        tracing::debug!(error = %e, "Bearer credential rejected");
                        "invalid token"
                    }
                    other => {
                        tracing::warn!(error = %other, "Failed to resolve bearer credential");
                        "could not validate credentials"
                    }
                });
                req.extensions_mut()
                    .insert(RejectedCredential(reason.to_string()));
            }
        }
    }

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id_str) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

/// Require authentication (a valid credential must be present).
pub fn require_auth(req: &Request) -> ApiResult<&AuthenticatedUser> {
    if let Some(user) = req.extensions().get::<AuthenticatedUser>() {
        return Ok(user);
    }
    let reason = req
        .extensions()
        .get::<RejectedCredential>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "authentication required".to_string());
    Err(ApiError::Unauthorized(reason))
}
