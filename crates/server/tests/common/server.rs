//! Server test utilities.

use crate::common::fixtures::{MultipartBody, json_request, multipart_request, send, test_png};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use certfolio_auth::password::MIN_ITERATIONS;
use certfolio_auth::{PasswordHasher, Pbkdf2PasswordHasher};
use certfolio_core::config::{AppConfig, MetadataConfig, StorageConfig};
use certfolio_metadata::repos::AdminRepo;
use certfolio_metadata::{MetadataStore, SqliteStore};
use certfolio_server::{AppState, create_router};
use certfolio_storage::{FilesystemBackend, ObjectStore};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Username of the seeded admin.
pub const ADMIN_USERNAME: &str = "portfolio-admin";

/// Password of the seeded admin.
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and a seeded admin.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("portfolio.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let hash = Pbkdf2PasswordHasher::with_iterations(MIN_ITERATIONS)
            .and_then(|hasher| hasher.hash(ADMIN_PASSWORD))
            .expect("Failed to hash admin password");
        metadata
            .create_admin(ADMIN_USERNAME, &hash)
            .await
            .expect("Failed to seed admin");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: storage_path.clone(),
        };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let state =
            AppState::new(config, storage, metadata).expect("Failed to create application state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage_path,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// POST /api/token with a urlencoded form.
    pub async fn login_raw(&self, username: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/token")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "username={}&password={}",
                form_encode(username),
                form_encode(password)
            )))
            .unwrap();
        send(&self.router, request).await
    }

    /// Log in as the seeded admin and return the bearer credential.
    pub async fn login(&self) -> String {
        let (status, body) = self.login_raw(ADMIN_USERNAME, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Create a certificate with a PNG attachment and return the response body.
    pub async fn create_certificate(
        &self,
        token: &str,
        title: &str,
        issuer: &str,
        tags: Option<&str>,
    ) -> Value {
        let mut form = MultipartBody::new()
            .text("title", title)
            .text("issuer", issuer)
            .text("issue_date", "2024-01-15");
        if let Some(tags) = tags {
            form = form.text("tags", tags);
        }
        let body = form
            .file("image", "cert.png", "image/png", &test_png())
            .finish();

        let (status, json) =
            multipart_request(&self.router, "POST", "/api/certificates", body, Some(token)).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
        json
    }

    /// GET a path with an optional bearer credential.
    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        json_request(&self.router, "GET", uri, None, token).await
    }

    /// Whether the attachment at `image_path` exists on disk.
    pub fn attachment_exists(&self, image_path: &str) -> bool {
        self.storage_path.join(image_path).is_file()
    }
}

fn form_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}
