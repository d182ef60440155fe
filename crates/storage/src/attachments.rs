//! Certificate attachment store.
//!
//! Attachments are PDFs or images stored under the `certificates/` namespace
//! of an [`ObjectStore`] with a random 128-bit name and the client's original
//! extension. Removal is best-effort: callers get a [`RemovalOutcome`] they
//! may log, never an error.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore};
use bytes::Bytes;
use certfolio_core::media::{self, ALLOWED_CONTENT_TYPES, ALLOWED_EXTENSIONS, AttachmentKind};
use certfolio_core::ATTACHMENT_NAMESPACE;
use rand_core::{OsRng, RngCore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a best-effort removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    NotFound,
    Failed(String),
}

impl RemovalOutcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Removed => "removed",
            Self::NotFound => "not_found",
            Self::Failed(_) => "failed",
        }
    }
}

/// An upload that passed the allow-set and size checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedAttachment {
    pub kind: AttachmentKind,
    /// Lowercased extension with leading dot, as supplied by the client.
    pub extension: String,
    pub size: u64,
}

/// Outcome of replacing an attachment.
#[derive(Clone, Debug)]
pub struct Replacement {
    /// Key of the newly stored attachment.
    pub path: String,
    /// What happened to the previous attachment.
    pub previous: RemovalOutcome,
}

/// Stores, replaces and removes certificate attachments.
#[derive(Clone)]
pub struct AttachmentStore {
    store: Arc<dyn ObjectStore>,
    max_bytes: u64,
}

impl AttachmentStore {
    pub fn new(store: Arc<dyn ObjectStore>, max_bytes: u64) -> Self {
        Self { store, max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check an upload against the content-type and extension allow-sets and
    /// the size ceiling.
    ///
    /// The two allow-sets are checked independently; a `.png` name with a
    /// PDF content type is accepted.
    pub fn validate(
        &self,
        content_type: Option<&str>,
        filename: Option<&str>,
        size: u64,
    ) -> StorageResult<ValidatedAttachment> {
        let content_type = content_type.map(str::trim).unwrap_or_default();
        let kind = AttachmentKind::from_content_type(content_type).ok_or_else(|| {
            StorageError::UnsupportedMediaType(format!(
                "content type '{content_type}' is not allowed (expected one of {})",
                ALLOWED_CONTENT_TYPES.join(", ")
            ))
        })?;

        let filename = filename.unwrap_or_default();
        let extension = media::extension_of(filename)
            .filter(|ext| AttachmentKind::from_extension(ext).is_some())
            .ok_or_else(|| {
                StorageError::UnsupportedMediaType(format!(
                    "file name '{filename}' must end in one of {}",
                    ALLOWED_EXTENSIONS.join(", ")
                ))
            })?;

        if size == 0 {
            return Err(StorageError::EmptyAttachment);
        }
        if size > self.max_bytes {
            return Err(StorageError::PayloadTooLarge {
                size,
                max: self.max_bytes,
            });
        }

        Ok(ValidatedAttachment {
            kind,
            extension,
            size,
        })
    }

    /// Validate and store a new attachment, returning its relative path.
    pub async fn store(
        &self,
        data: Bytes,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> StorageResult<String> {
        let validated = self.validate(content_type, filename, data.len() as u64)?;
        self.write(data, &validated).await
    }

    /// Store bytes that already passed [`validate`](Self::validate).
    pub async fn write(&self, data: Bytes, validated: &ValidatedAttachment) -> StorageResult<String> {
        let path = generate_key(&validated.extension);
        self.store.put(&path, data).await?;
        info!(
            path = %path,
            kind = %validated.kind,
            size = validated.size,
            "Stored attachment"
        );
        Ok(path)
    }

    /// Replace the attachment at `existing` with new content.
    ///
    /// The new upload is validated first so a rejected upload leaves the old
    /// file in place. The old file is then removed best-effort and the new
    /// one written under a fresh name.
    pub async fn replace(
        &self,
        existing: &str,
        data: Bytes,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> StorageResult<Replacement> {
        let validated = self.validate(content_type, filename, data.len() as u64)?;
        let previous = self.delete(existing).await;
        let path = self.write(data, &validated).await?;
        Ok(Replacement { path, previous })
    }

    /// Remove an attachment, swallowing every failure.
    pub async fn delete(&self, path: &str) -> RemovalOutcome {
        match self.store.delete(path).await {
            Ok(()) => {
                debug!(path = %path, "Removed attachment");
                RemovalOutcome::Removed
            }
            Err(StorageError::NotFound(_)) => {
                debug!(path = %path, "Attachment already absent");
                RemovalOutcome::NotFound
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to remove attachment");
                RemovalOutcome::Failed(e.to_string())
            }
        }
    }

    /// Check whether an attachment exists.
    pub async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.store.exists(path).await
    }

    /// Open an attachment for serving. Keys outside the attachment namespace
    /// are reported as not found.
    pub async fn open(&self, path: &str) -> StorageResult<(ObjectMeta, ByteStream)> {
        if !in_namespace(path) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let meta = self.store.head(path).await?;
        let stream = self.store.get_stream(path).await?;
        Ok((meta, stream))
    }
}

fn in_namespace(path: &str) -> bool {
    path.strip_prefix(ATTACHMENT_NAMESPACE)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty())
}

/// `certificates/<32 hex chars><ext>` from 128 bits of OS randomness.
fn generate_key(extension: &str) -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let name: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{ATTACHMENT_NAMESPACE}/{name}{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilesystemBackend;

    async fn store_in(dir: &std::path::Path, max_bytes: u64) -> AttachmentStore {
        let backend = FilesystemBackend::new(dir).await.unwrap();
        AttachmentStore::new(Arc::new(backend), max_bytes)
    }

    #[test]
    fn generated_keys_have_expected_shape() {
        let key = generate_key(".png");
        let name = key.strip_prefix("certificates/").unwrap();
        let stem = name.strip_suffix(".png").unwrap();
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(generate_key(".png"), key);
    }

    #[test]
    fn namespace_check() {
        assert!(in_namespace("certificates/abc.png"));
        assert!(!in_namespace("certificates/"));
        assert!(!in_namespace("certificates"));
        assert!(!in_namespace("other/abc.png"));
        assert!(!in_namespace("certificatesx/abc.png"));
    }

    #[tokio::test]
    async fn validate_checks_each_allow_set_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 100).await;

        let ok = store
            .validate(Some("application/pdf"), Some("scan.PNG"), 10)
            .unwrap();
        assert_eq!(ok.kind, AttachmentKind::Pdf);
        assert_eq!(ok.extension, ".png");

        assert!(matches!(
            store.validate(Some("image/gif"), Some("a.png"), 10),
            Err(StorageError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            store.validate(Some("image/png"), Some("a.gif"), 10),
            Err(StorageError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            store.validate(None, Some("a.png"), 10),
            Err(StorageError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            store.validate(Some("image/png"), None, 10),
            Err(StorageError::UnsupportedMediaType(_))
        ));
    }

    #[tokio::test]
    async fn validate_enforces_size_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 100).await;

        assert!(store.validate(Some("image/png"), Some("a.png"), 100).is_ok());
        assert!(matches!(
            store.validate(Some("image/png"), Some("a.png"), 101),
            Err(StorageError::PayloadTooLarge { size: 101, max: 100 })
        ));
        assert!(matches!(
            store.validate(Some("image/png"), Some("a.png"), 0),
            Err(StorageError::EmptyAttachment)
        ));
    }

    #[tokio::test]
    async fn store_writes_under_namespace_with_original_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 1024).await;

        let path = store
            .store(Bytes::from_static(b"\x89PNG"), Some("image/png"), Some("Cert.PNG"))
            .await
            .unwrap();
        assert!(path.starts_with("certificates/"));
        assert!(path.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&path)).unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn rejected_upload_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 4).await;

        let err = store
            .store(Bytes::from_static(b"too large"), Some("image/png"), Some("a.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PayloadTooLarge { .. }));
        assert!(!dir.path().join("certificates").exists());
    }

    #[tokio::test]
    async fn delete_reports_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 1024).await;
        let path = store
            .store(Bytes::from_static(b"%PDF"), Some("application/pdf"), Some("a.pdf"))
            .await
            .unwrap();

        assert_eq!(store.delete(&path).await, RemovalOutcome::Removed);
        assert_eq!(store.delete(&path).await, RemovalOutcome::NotFound);
        assert!(matches!(
            store.delete("../outside.pdf").await,
            RemovalOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn replace_removes_old_and_writes_new() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 1024).await;
        let old = store
            .store(Bytes::from_static(b"old"), Some("image/png"), Some("a.png"))
            .await
            .unwrap();

        let replaced = store
            .replace(&old, Bytes::from_static(b"new"), Some("image/webp"), Some("b.webp"))
            .await
            .unwrap();
        assert_ne!(replaced.path, old);
        assert!(replaced.path.ends_with(".webp"));
        assert_eq!(replaced.previous, RemovalOutcome::Removed);
        assert!(!store.exists(&old).await.unwrap());
        assert!(store.exists(&replaced.path).await.unwrap());
    }

    #[tokio::test]
    async fn replace_tolerates_missing_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 1024).await;

        let replaced = store
            .replace(
                "certificates/gone.png",
                Bytes::from_static(b"new"),
                Some("image/png"),
                Some("b.png"),
            )
            .await
            .unwrap();
        assert_eq!(replaced.previous, RemovalOutcome::NotFound);
        assert!(store.exists(&replaced.path).await.unwrap());
    }

    #[tokio::test]
    async fn rejected_replacement_keeps_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 1024).await;
        let old = store
            .store(Bytes::from_static(b"old"), Some("image/png"), Some("a.png"))
            .await
            .unwrap();

        let err = store
            .replace(&old, Bytes::from_static(b"new"), Some("text/plain"), Some("b.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedMediaType(_)));
        assert!(store.exists(&old).await.unwrap());
    }

    #[tokio::test]
    async fn open_only_serves_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FilesystemBackend::new(dir.path()).await.unwrap());
        backend.put("private/db.sqlite", Bytes::from("x")).await.unwrap();
        let store = AttachmentStore::new(backend, 1024);

        assert!(matches!(
            store.open("private/db.sqlite").await,
            Err(StorageError::NotFound(_))
        ));

        let path = store
            .store(Bytes::from_static(b"img"), Some("image/jpeg"), Some("x.jpg"))
            .await
            .unwrap();
        let (meta, _stream) = store.open(&path).await.unwrap();
        assert_eq!(meta.size, 3);
    }
}
