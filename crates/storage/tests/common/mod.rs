use async_trait::async_trait;
use bytes::Bytes;
use certfolio_storage::{ByteStream, FilesystemBackend, ObjectMeta, ObjectStore, StorageResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

/// Filesystem store whose deletes can be switched to fail with an I/O error.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: FilesystemBackend,
    fail_deletes: AtomicBool,
}

#[allow(dead_code)]
impl FaultyStore {
    pub async fn new(dir: &TempDir) -> Arc<Self> {
        Arc::new(Self {
            inner: FilesystemBackend::new(dir.path()).await.unwrap(),
            fail_deletes: AtomicBool::new(false),
        })
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("injected delete failure").into());
        }
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
