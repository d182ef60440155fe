//! Login and identity endpoints.

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Request, State};
use axum::Json;
use certfolio_core::format_timestamp;
use serde::{Deserialize, Serialize};

/// Login form (`application/x-www-form-urlencoded`).
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Issued bearer credential.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// POST /api/token - Exchange username and password for a bearer credential.
pub async fn issue_token(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let admin = state
        .gateway
        .authenticate(&form.username, &form.password)
        .await?;
    let issued = state.gateway.issue_token(&admin)?;

    Ok(Json(TokenResponse {
        expires_in: issued.expires_in_secs(),
        access_token: issued.access_token,
        token_type: issued.token_type,
    }))
}

/// The authenticated admin identity.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

/// GET /api/me - Return the identity behind the presented credential.
pub async fn me(req: Request) -> ApiResult<Json<MeResponse>> {
    let admin = &require_auth(&req)?.admin;

    Ok(Json(MeResponse {
        id: admin.admin_id,
        username: admin.username.clone(),
        created_at: format_timestamp(admin.created_at)?,
    }))
}
