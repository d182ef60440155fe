//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Admin identities
// =============================================================================

/// Admin identity record.
#[derive(Debug, Clone, FromRow)]
pub struct AdminRow {
    pub admin_id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Certificates
// =============================================================================

/// Certificate record.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CertificateRow {
    pub certificate_id: i64,
    pub title: String,
    pub issuer: String,
    pub issue_date: OffsetDateTime,
    pub expiry_date: Option<OffsetDateTime>,
    pub credential_id: Option<String>,
    pub verify_url: Option<String>,
    pub tags: Option<String>,
    /// Relative key of the attachment in the object store.
    pub image_path: String,
    pub created_at: OffsetDateTime,
}

/// A certificate about to be inserted. ID and creation time are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub title: String,
    pub issuer: String,
    pub issue_date: OffsetDateTime,
    pub expiry_date: Option<OffsetDateTime>,
    pub credential_id: Option<String>,
    pub verify_url: Option<String>,
    pub tags: Option<String>,
    pub image_path: String,
}

/// Partial update of a certificate record.
///
/// `None` leaves a field untouched. For nullable columns, `Some(None)`
/// clears the value.
#[derive(Debug, Clone, Default)]
pub struct CertificatePatch {
    pub title: Option<String>,
    pub issuer: Option<String>,
    pub issue_date: Option<OffsetDateTime>,
    pub expiry_date: Option<Option<OffsetDateTime>>,
    pub credential_id: Option<Option<String>>,
    pub verify_url: Option<Option<String>>,
    pub tags: Option<Option<String>>,
    pub image_path: Option<String>,
}

impl CertificatePatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.issuer.is_none()
            && self.issue_date.is_none()
            && self.expiry_date.is_none()
            && self.credential_id.is_none()
            && self.verify_url.is_none()
            && self.tags.is_none()
            && self.image_path.is_none()
    }

    /// Apply the present fields to `row`.
    pub fn apply(&self, row: &mut CertificateRow) {
        if let Some(title) = &self.title {
            row.title.clone_from(title);
        }
        if let Some(issuer) = &self.issuer {
            row.issuer.clone_from(issuer);
        }
        if let Some(issue_date) = self.issue_date {
            row.issue_date = issue_date;
        }
        if let Some(expiry_date) = self.expiry_date {
            row.expiry_date = expiry_date;
        }
        if let Some(credential_id) = &self.credential_id {
            row.credential_id.clone_from(credential_id);
        }
        if let Some(verify_url) = &self.verify_url {
            row.verify_url.clone_from(verify_url);
        }
        if let Some(tags) = &self.tags {
            row.tags.clone_from(tags);
        }
        if let Some(image_path) = &self.image_path {
            row.image_path.clone_from(image_path);
        }
    }
}

/// Listing filters and pagination.
///
/// Text filters are case-insensitive substring matches; blank filters are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    /// Substring of the issuer.
    pub issuer: Option<String>,
    /// Substring of the raw comma-separated tags field.
    pub tag: Option<String>,
    /// Substring of the title.
    pub q: Option<String>,
    pub skip: u32,
    pub limit: u32,
}
