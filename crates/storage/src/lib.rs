//! Object storage abstraction and the certificate attachment store.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait over a flat key namespace
//! - A local filesystem backend with path traversal protection
//! - [`AttachmentStore`], which validates, names, replaces and removes
//!   certificate files on top of an object store

pub mod attachments;
pub mod backends;
pub mod error;
pub mod traits;

pub use attachments::{AttachmentStore, RemovalOutcome, Replacement, ValidatedAttachment};
pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore};

use certfolio_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
