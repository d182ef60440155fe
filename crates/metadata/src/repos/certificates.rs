//! Certificate record repository.

use crate::error::MetadataResult;
use crate::models::{CertificateFilter, CertificatePatch, CertificateRow, NewCertificate};
use async_trait::async_trait;

/// Repository for certificate records.
#[async_trait]
pub trait CertificateRepo: Send + Sync {
    /// Insert a record, assigning its ID and creation time.
    async fn insert_certificate(&self, cert: &NewCertificate) -> MetadataResult<CertificateRow>;

    /// Get a record by ID.
    async fn get_certificate(&self, certificate_id: i64) -> MetadataResult<Option<CertificateRow>>;

    /// List records matching `filter`, newest ID first.
    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> MetadataResult<Vec<CertificateRow>>;

    /// Apply the present fields of `patch` atomically. Fails with `NotFound`
    /// if the record does not exist.
    async fn update_certificate(
        &self,
        certificate_id: i64,
        patch: &CertificatePatch,
    ) -> MetadataResult<CertificateRow>;

    /// Delete a record. Fails with `NotFound` if the record does not exist.
    async fn delete_certificate(&self, certificate_id: i64) -> MetadataResult<()>;
}
