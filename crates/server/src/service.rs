//! Certificate service: couples attachment files with certificate records.
//!
//! Ordering rules:
//! - create writes the file first and inserts the record second, so a
//!   record never points at a missing file
//! - replace validates the upload, removes the old file best-effort, writes
//!   the new file, then repoints the record
//! - delete removes the file best-effort and then the record; the record
//!   deletion decides the outcome

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use bytes::Bytes;
use certfolio_core::date::ensure_date_order;
use certfolio_core::{parse_flexible_date, validate};
use certfolio_metadata::MetadataStore;
use certfolio_metadata::models::{
    CertificateFilter, CertificatePatch, CertificateRow, NewCertificate,
};
use certfolio_storage::{AttachmentStore, RemovalOutcome};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::{info, warn};

/// Certificate fields as submitted on create, before validation.
#[derive(Debug, Clone, Default)]
pub struct CertificateDraft {
    pub title: String,
    pub issuer: String,
    pub issue_date: String,
    pub expiry_date: Option<String>,
    pub credential_id: Option<String>,
    pub verify_url: Option<String>,
    pub tags: Option<String>,
}

/// An uploaded attachment as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

/// Partial update body.
///
/// Each field is `None` when absent, `Some(None)` when explicitly `null`
/// and `Some(Some(value))` otherwise.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateChanges {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub issuer: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub issue_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub expiry_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub credential_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub verify_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub tags: Option<Option<String>>,
}

/// Marks a field as present, keeping `null` distinguishable from absent.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn not_null(field: &str, value: Option<Option<String>>) -> ApiResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(None) => Err(ApiError::BadRequest(format!("{field} cannot be null"))),
        Some(Some(v)) => Ok(Some(v)),
    }
}

/// `null` or blank clears the field.
fn clearable(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|v| validate::optional_text(v.as_deref()))
}

fn not_found(certificate_id: i64) -> ApiError {
    ApiError::NotFound(format!("certificate {certificate_id} not found"))
}

/// Orchestrates the attachment store and the certificate repository.
pub struct CertificateService {
    metadata: Arc<dyn MetadataStore>,
    attachments: AttachmentStore,
}

impl CertificateService {
    pub fn new(metadata: Arc<dyn MetadataStore>, attachments: AttachmentStore) -> Self {
        Self {
            metadata,
            attachments,
        }
    }

    /// Validate the upload and fields, store the file, then insert the record.
    pub async fn create(
        &self,
        draft: CertificateDraft,
        upload: Upload,
    ) -> ApiResult<CertificateRow> {
        let validated = self.attachments.validate(
            upload.content_type.as_deref(),
            upload.filename.as_deref(),
            upload.data.len() as u64,
        )?;

        let issue_date = parse_flexible_date(&draft.issue_date)?;
        let expiry_date = validate::optional_text(draft.expiry_date.as_deref())
            .map(|v| parse_flexible_date(&v))
            .transpose()?;
        ensure_date_order(issue_date, expiry_date)?;

        let title = validate::title(&draft.title)?;
        let issuer = validate::issuer(&draft.issuer)?;
        let verify_url = validate::optional_text(draft.verify_url.as_deref())
            .map(|v| validate::verify_url(&v))
            .transpose()?;

        let image_path = self.attachments.write(upload.data, &validated).await?;
        metrics::ATTACHMENT_BYTES_STORED.inc_by(validated.size);

        let new = NewCertificate {
            title,
            issuer,
            issue_date,
            expiry_date,
            credential_id: validate::optional_text(draft.credential_id.as_deref()),
            verify_url,
            tags: validate::optional_text(draft.tags.as_deref()),
            image_path,
        };

        let row = match self.metadata.insert_certificate(&new).await {
            Ok(row) => row,
            Err(e) => {
                warn!(
                    path = %new.image_path,
                    error = %e,
                    "Certificate insert failed after attachment write; attachment orphaned"
                );
                return Err(e.into());
            }
        };

        metrics::CERTIFICATES_CREATED.inc();
        info!(
            certificate_id = row.certificate_id,
            path = %row.image_path,
            "Certificate created"
        );
        Ok(row)
    }

    pub async fn get(&self, certificate_id: i64) -> ApiResult<CertificateRow> {
        self.metadata
            .get_certificate(certificate_id)
            .await?
            .ok_or_else(|| not_found(certificate_id))
    }

    pub async fn list(&self, filter: &CertificateFilter) -> ApiResult<Vec<CertificateRow>> {
        Ok(self.metadata.list_certificates(filter).await?)
    }

    /// Apply the fields present in `changes`. The attachment is never touched.
    pub async fn update(
        &self,
        certificate_id: i64,
        changes: CertificateChanges,
    ) -> ApiResult<CertificateRow> {
        let current = self.get(certificate_id).await?;

        let title = not_null("title", changes.title)?
            .map(|v| validate::title(&v))
            .transpose()?;
        let issuer = not_null("issuer", changes.issuer)?
            .map(|v| validate::issuer(&v))
            .transpose()?;
        let issue_date = not_null("issue_date", changes.issue_date)?
            .map(|v| parse_flexible_date(&v))
            .transpose()?;
        let expiry_date = clearable(changes.expiry_date)
            .map(|v| v.map(|s| parse_flexible_date(&s)).transpose())
            .transpose()?;
        let verify_url = clearable(changes.verify_url)
            .map(|v| v.map(|s| validate::verify_url(&s)).transpose())
            .transpose()?;

        let patch = CertificatePatch {
            title,
            issuer,
            issue_date,
            expiry_date,
            credential_id: clearable(changes.credential_id),
            verify_url,
            tags: clearable(changes.tags),
            image_path: None,
        };

        // The merged record must still be ordered.
        ensure_date_order(
            patch.issue_date.unwrap_or(current.issue_date),
            patch.expiry_date.unwrap_or(current.expiry_date),
        )?;

        if patch.is_empty() {
            return Ok(current);
        }

        let row = self
            .metadata
            .update_certificate(certificate_id, &patch)
            .await?;
        metrics::CERTIFICATES_UPDATED.inc();
        info!(certificate_id, "Certificate updated");
        Ok(row)
    }

    /// Swap the attachment of an existing certificate.
    pub async fn replace_file(
        &self,
        certificate_id: i64,
        upload: Upload,
    ) -> ApiResult<CertificateRow> {
        let current = self.get(certificate_id).await?;
        let size = upload.data.len() as u64;

        let replacement = self
            .attachments
            .replace(
                &current.image_path,
                upload.data,
                upload.content_type.as_deref(),
                upload.filename.as_deref(),
            )
            .await?;
        metrics::record_cleanup(&replacement.previous);
        metrics::ATTACHMENT_BYTES_STORED.inc_by(size);

        let patch = CertificatePatch {
            image_path: Some(replacement.path.clone()),
            ..Default::default()
        };
        let row = match self
            .metadata
            .update_certificate(certificate_id, &patch)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(
                    certificate_id,
                    path = %replacement.path,
                    error = %e,
                    "Record update failed after attachment replace; attachment orphaned"
                );
                return Err(e.into());
            }
        };

        metrics::CERTIFICATE_FILES_REPLACED.inc();
        info!(
            certificate_id,
            old_path = %current.image_path,
            new_path = %row.image_path,
            previous = replacement.previous.label(),
            "Certificate attachment replaced"
        );
        Ok(row)
    }

    /// Remove the attachment best-effort, then the record.
    ///
    /// The returned outcome is informational; the record is gone either way.
    pub async fn delete(&self, certificate_id: i64) -> ApiResult<RemovalOutcome> {
        let current = self.get(certificate_id).await?;

        let outcome = self.attachments.delete(&current.image_path).await;
        metrics::record_cleanup(&outcome);

        self.metadata.delete_certificate(certificate_id).await?;
        metrics::CERTIFICATES_DELETED.inc();
        info!(
            certificate_id,
            attachment = outcome.label(),
            "Certificate deleted"
        );
        Ok(outcome)
    }
}
