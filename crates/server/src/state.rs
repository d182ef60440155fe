//! Application state shared across handlers.

use crate::auth::AuthGateway;
use crate::ratelimit::RateLimitState;
use crate::service::CertificateService;
use anyhow::{Context, Result};
use certfolio_auth::{PasswordHasher, Pbkdf2PasswordHasher, TokenSigner};
use certfolio_core::config::AppConfig;
use certfolio_metadata::MetadataStore;
use certfolio_storage::{AttachmentStore, ObjectStore};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Certificate attachments on top of the object store.
    pub attachments: AttachmentStore,
    /// Credential verification and bearer credential handling.
    pub gateway: Arc<AuthGateway>,
    /// Certificate lifecycle operations.
    pub certificates: Arc<CertificateService>,
    /// Rate limiting state.
    pub rate_limit: RateLimitState,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Validates the configuration and logs warnings for risky settings.
    /// Fails if any section is invalid or the signing secret is too weak.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let warnings = config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid configuration")?;
        for warning in warnings {
            tracing::warn!("Configuration warning: {}", warning);
        }

        let signer = TokenSigner::from_config(&config.auth).context("invalid auth.secret_key")?;
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Pbkdf2PasswordHasher::new());
        let gateway = AuthGateway::new(metadata.clone(), hasher, signer);

        let attachments = AttachmentStore::new(storage, config.server.max_upload_bytes);
        let certificates = CertificateService::new(metadata.clone(), attachments.clone());
        let rate_limit = RateLimitState::new(&config.rate_limit);

        Ok(Self {
            config: Arc::new(config),
            metadata,
            attachments,
            gateway: Arc::new(gateway),
            certificates: Arc::new(certificates),
            rate_limit,
        })
    }

    /// Interval for the rate limiter cleanup task, or `None` when disabled.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        self.rate_limit
            .is_enabled()
            .then(|| Duration::from_secs(self.config.rate_limit.cleanup_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certfolio_metadata::SqliteStore;
    use certfolio_storage::FilesystemBackend;
    use tempfile::{TempDir, tempdir};

    async fn build_state(config: AppConfig) -> (TempDir, Result<AppState>) {
        let temp = tempdir().unwrap();
        let storage: Arc<dyn ObjectStore> =
            Arc::new(FilesystemBackend::new(temp.path()).await.unwrap());
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("portfolio.db"), None)
                .await
                .unwrap(),
        );
        let state = AppState::new(config, storage, metadata);
        (temp, state)
    }

    #[tokio::test]
    async fn rate_limit_cleanup_interval_none_when_disabled() {
        let (_temp, state) = build_state(AppConfig::for_testing()).await;
        assert!(state.unwrap().rate_limit_cleanup_interval().is_none());
    }

    #[tokio::test]
    async fn rate_limit_cleanup_interval_enabled_respects_config() {
        let mut config = AppConfig::for_testing();
        config.rate_limit.enabled = true;
        config.rate_limit.cleanup_interval_secs = 12;

        let (_temp, state) = build_state(config).await;
        assert_eq!(
            state.unwrap().rate_limit_cleanup_interval(),
            Some(Duration::from_secs(12))
        );
    }

    #[tokio::test]
    async fn weak_secret_is_rejected() {
        let mut config = AppConfig::for_testing();
        config.auth.secret_key = "short".to_string();

        let (_temp, state) = build_state(config).await;
        assert!(state.is_err());
    }

    #[tokio::test]
    async fn zero_cleanup_interval_is_rejected() {
        let mut config = AppConfig::for_testing();
        config.rate_limit.enabled = true;
        config.rate_limit.cleanup_interval_secs = 0;

        let (_temp, state) = build_state(config).await;
        assert!(state.is_err());
    }
}
