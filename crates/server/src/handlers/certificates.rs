//! Certificate endpoints.
//!
//! Reads are public. Mutations require a bearer credential and go through
//! [`CertificateService`](crate::service::CertificateService).

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::service::{CertificateChanges, CertificateDraft, Upload};
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::StatusCode;
use certfolio_core::format_timestamp;
use certfolio_metadata::models::{CertificateFilter, CertificateRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum size of a JSON update body.
const MAX_PATCH_BODY_SIZE: usize = 64 * 1024;

/// Multipart part carrying the file on create.
pub const CREATE_FILE_FIELD: &str = "image";

/// Multipart part carrying the file on replace.
pub const REPLACE_FILE_FIELD: &str = "new_file";

/// Certificate as returned by the API.
#[derive(Debug, Serialize)]
pub struct CertificateResponse {
    pub id: i64,
    pub title: String,
    pub issuer: String,
    pub issue_date: String,
    pub expiry_date: Option<String>,
    pub credential_id: Option<String>,
    pub verify_url: Option<String>,
    pub tags: Option<String>,
    pub image_path: String,
    pub created_at: String,
}

impl TryFrom<CertificateRow> for CertificateResponse {
    type Error = ApiError;

    fn try_from(row: CertificateRow) -> ApiResult<Self> {
        Ok(Self {
            id: row.certificate_id,
            title: row.title,
            issuer: row.issuer,
            issue_date: format_timestamp(row.issue_date)?,
            expiry_date: row.expiry_date.map(format_timestamp).transpose()?,
            credential_id: row.credential_id,
            verify_url: row.verify_url,
            tags: row.tags,
            image_path: row.image_path,
            created_at: format_timestamp(row.created_at)?,
        })
    }
}

/// Deletion acknowledgement.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
}

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub issuer: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
}

/// Text fields and at most one file from a multipart body.
struct MultipartForm {
    fields: HashMap<String, String>,
    file: Option<Upload>,
}

impl MultipartForm {
    async fn read(req: Request, state: &AppState, file_field: &str) -> ApiResult<Self> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let mut fields = HashMap::new();
        let mut file = None;
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            if name == file_field {
                let content_type = field.content_type().map(str::to_owned);
                let filename = field.file_name().map(str::to_owned);
                let data = field.bytes().await?;
                file = Some(Upload {
                    data,
                    content_type,
                    filename,
                });
            } else {
                let value = field.text().await?;
                fields.insert(name, value);
            }
        }

        Ok(Self { fields, file })
    }

    fn required(&mut self, name: &str) -> ApiResult<String> {
        self.fields
            .remove(name)
            .ok_or_else(|| ApiError::BadRequest(format!("missing form field: {name}")))
    }

    fn optional(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    fn file(&mut self, name: &str) -> ApiResult<Upload> {
        self.file
            .take()
            .ok_or_else(|| ApiError::BadRequest(format!("missing file part: {name}")))
    }
}

fn certificate_id(path: Result<Path<i64>, PathRejection>) -> ApiResult<i64> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// POST /api/certificates - Create a certificate from a multipart form.
pub async fn create_certificate(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CertificateResponse>)> {
    require_auth(&req)?;

    let mut form = MultipartForm::read(req, &state, CREATE_FILE_FIELD).await?;
    let draft = CertificateDraft {
        title: form.required("title")?,
        issuer: form.required("issuer")?,
        issue_date: form.required("issue_date")?,
        expiry_date: form.optional("expiry_date"),
        credential_id: form.optional("credential_id"),
        verify_url: form.optional("verify_url"),
        tags: form.optional("tags"),
    };
    let upload = form.file(CREATE_FILE_FIELD)?;

    let row = state.certificates.create(draft, upload).await?;
    Ok((StatusCode::CREATED, Json(CertificateResponse::try_from(row)?)))
}

/// GET /api/certificates - Public filtered listing, newest first.
pub async fn list_certificates(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<CertificateResponse>>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let filter = CertificateFilter {
        issuer: query.issuer,
        tag: query.tag,
        q: query.q,
        skip: query.skip.unwrap_or(0),
        limit: state.config.listing.clamp_limit(query.limit),
    };

    let rows = state.certificates.list(&filter).await?;
    let certificates = rows
        .into_iter()
        .map(CertificateResponse::try_from)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(certificates))
}

/// GET /api/certificates/{id} - Public single record.
pub async fn get_certificate(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<CertificateResponse>> {
    let id = certificate_id(path)?;
    let row = state.certificates.get(id).await?;
    Ok(Json(CertificateResponse::try_from(row)?))
}

/// PATCH /api/certificates/{id} - Partial metadata update.
pub async fn update_certificate(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    req: Request,
) -> ApiResult<Json<CertificateResponse>> {
    require_auth(&req)?;
    let id = certificate_id(path)?;

    let changes: CertificateChanges = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_PATCH_BODY_SIZE)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?
    };

    let row = state.certificates.update(id, changes).await?;
    Ok(Json(CertificateResponse::try_from(row)?))
}

/// PUT /api/certificates/{id}/file - Replace the attachment.
pub async fn replace_certificate_file(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    req: Request,
) -> ApiResult<Json<CertificateResponse>> {
    require_auth(&req)?;
    let id = certificate_id(path)?;

    let mut form = MultipartForm::read(req, &state, REPLACE_FILE_FIELD).await?;
    let upload = form.file(REPLACE_FILE_FIELD)?;

    let row = state.certificates.replace_file(id, upload).await?;
    Ok(Json(CertificateResponse::try_from(row)?))
}

/// DELETE /api/certificates/{id} - Delete a certificate and its attachment.
pub async fn delete_certificate(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    req: Request,
) -> ApiResult<Json<DeleteResponse>> {
    require_auth(&req)?;
    let id = certificate_id(path)?;

    state.certificates.delete(id).await?;
    Ok(Json(DeleteResponse { status: "deleted" }))
}
