//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Minimum length of the bearer credential signing secret in bytes.
pub const MIN_SECRET_KEY_BYTES: usize = 32;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Origins allowed to call the API from a browser.
    /// Empty disables the CORS layer entirely.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
    /// Maximum attachment size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_upload_bytes() -> u64 {
    crate::DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            cors_allowed_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be greater than 0".to_string());
        }
        if usize::try_from(self.max_upload_bytes).is_err() {
            return Err(format!(
                "server.max_upload_bytes {} does not fit in memory on this platform",
                self.max_upload_bytes
            ));
        }
        if self.cors_allowed_origins.iter().any(|o| o.trim().is_empty()) {
            return Err("server.cors_allowed_origins cannot contain empty entries".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("storage.path cannot be empty".to_string())
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        /// Logs warnings for queries exceeding this duration.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/portfolio.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { path, .. } if path.as_os_str().is_empty() => {
                Err("metadata.path cannot be empty".to_string())
            }
            MetadataConfig::Sqlite {
                query_timeout_secs: Some(0),
                ..
            } => Err("metadata.query_timeout_secs cannot be 0".to_string()),
            MetadataConfig::Sqlite { .. } => Ok(()),
        }
    }
}

/// HMAC algorithm used to sign bearer credentials.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

/// Admin identity seeded at startup.
///
/// If the identity exists with a different hash, the stored hash is rotated
/// to this one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminSeedConfig {
    pub username: String,
    /// Encoded hash as printed by `certfoliod hash-password`.
    pub password_hash: String,
}

/// Authentication configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Symmetric signing secret for bearer credentials.
    /// WARNING: Prefer CERTFOLIO_AUTH__SECRET_KEY over storing it in config files.
    pub secret_key: String,
    #[serde(default)]
    pub algorithm: TokenAlgorithm,
    /// Credential lifetime in minutes (default: 720).
    #[serde(default = "default_access_token_expire_minutes")]
    pub access_token_expire_minutes: u64,
    /// Optional admin seed.
    #[serde(default)]
    pub admin: Option<AdminSeedConfig>,
}

fn default_access_token_expire_minutes() -> u64 {
    crate::DEFAULT_TOKEN_EXPIRE_MINUTES
}

impl AuthConfig {
    /// Create a test configuration with a fixed secret.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            secret_key: "certfolio-test-secret-key-0123456789abcdef".to_string(),
            algorithm: TokenAlgorithm::HS256,
            access_token_expire_minutes: default_access_token_expire_minutes(),
            admin: None,
        }
    }

    /// Validate authentication configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.secret_key.len() < MIN_SECRET_KEY_BYTES {
            return Err(format!(
                "auth.secret_key must be at least {MIN_SECRET_KEY_BYTES} bytes (got {})",
                self.secret_key.len()
            ));
        }
        if self.access_token_expire_minutes == 0 {
            return Err("auth.access_token_expire_minutes must be greater than 0".to_string());
        }
        // Keep the lifetime representable as signed seconds.
        if self.access_token_expire_minutes > (i64::MAX as u64) / 60 {
            return Err(format!(
                "auth.access_token_expire_minutes {} is too large",
                self.access_token_expire_minutes
            ));
        }
        if let Some(admin) = &self.admin {
            crate::validate::username(&admin.username)
                .map_err(|e| format!("auth.admin.username: {e}"))?;
            if admin.password_hash.trim().is_empty() {
                return Err("auth.admin.password_hash cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

/// Public listing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Page size when the client sends no `limit`.
    #[serde(default = "default_listing_limit")]
    pub default_limit: u32,
    /// Upper bound applied to any client-supplied `limit`.
    #[serde(default = "default_listing_max_limit")]
    pub max_limit: u32,
}

fn default_listing_limit() -> u32 {
    50
}

fn default_listing_max_limit() -> u32 {
    500
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_listing_limit(),
            max_limit: default_listing_max_limit(),
        }
    }
}

impl ListingConfig {
    /// Resolve a requested page size against the configured bounds.
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }

    /// Validate listing configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_limit == 0 {
            return Err("listing.max_limit must be greater than 0".to_string());
        }
        if self.default_limit > self.max_limit {
            return Err(format!(
                "listing.default_limit {} exceeds listing.max_limit {}",
                self.default_limit, self.max_limit
            ));
        }
        Ok(())
    }
}

/// Rate limiting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default)]
    pub enabled: bool,
    /// Requests per minute per IP across all routes.
    #[serde(default = "default_ip_requests_per_minute")]
    pub ip_requests_per_minute: u32,
    /// Requests per minute per IP on the login route.
    #[serde(default = "default_login_requests_per_minute")]
    pub login_requests_per_minute: u32,
    /// Burst size (allows temporary burst above rate limit).
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Only requests from these IPs will have X-Forwarded-For/X-Real-IP headers trusted.
    /// If empty, forwarded headers are never trusted (only direct connection IP is used).
    /// Use ["*"] to trust all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum number of unique IPs to track before rejecting new entries.
    /// When the limit is reached, new IPs are rejected with 429 until cleanup runs.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Interval in seconds between cleanup sweeps of stale entries (default: 60).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Time-to-live in seconds for rate limit entries (default: 300).
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
}

fn default_ip_requests_per_minute() -> u32 {
    120
}

fn default_login_requests_per_minute() -> u32 {
    10
}

fn default_burst_size() -> u32 {
    20
}

fn default_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_entry_ttl_secs() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ip_requests_per_minute: default_ip_requests_per_minute(),
            login_requests_per_minute: default_login_requests_per_minute(),
            burst_size: default_burst_size(),
            trusted_proxies: Vec::new(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            entry_ttl_secs: default_entry_ttl_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate rate limit configuration.
    /// Returns warnings for configs that are insecure but allowed,
    /// and errors for configs that should be rejected.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        // tokio::time::interval panics on a zero period.
        if self.cleanup_interval_secs == 0 {
            return Err("rate_limit.cleanup_interval_secs cannot be 0".to_string());
        }

        if self.ip_requests_per_minute == 0 || self.login_requests_per_minute == 0 {
            return Err("rate_limit request quotas must be greater than 0".to_string());
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts ALL forwarded headers. \
                 Clients can spoof their IP address and bypass rate limits."
                    .to_string(),
            );
        }

        if self.entry_ttl_secs < 120 {
            warnings.push(format!(
                "rate_limit.entry_ttl_secs={} is very short; entries may be evicted \
                 before limits reset. Recommended minimum: 120 seconds.",
                self.entry_ttl_secs
            ));
        }

        Ok(warnings)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Authentication configuration (required).
    pub auth: AuthConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// and a fixed signing secret.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            auth: AuthConfig::for_testing(),
            listing: ListingConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Validate every section. Returns rate limit warnings on success.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.metadata.validate()?;
        self.auth.validate()?;
        self.listing.validate()?;
        self.rate_limit.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert!(config.metrics_enabled);
        assert!(config.cors_allowed_origins.is_empty());
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_auth_config_requires_long_secret() {
        let mut config = AuthConfig::for_testing();
        config.validate().unwrap();

        config.secret_key = "too-short".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("at least 32 bytes"), "{err}");
    }

    #[test]
    fn test_auth_config_rejects_bad_admin_seed() {
        let mut config = AuthConfig::for_testing();
        config.admin = Some(AdminSeedConfig {
            username: "ab".to_string(),
            password_hash: "$pbkdf2-sha256$i=10000$AAAA$BBBB".to_string(),
        });
        assert!(config.validate().is_err());

        config.admin = Some(AdminSeedConfig {
            username: "admin".to_string(),
            password_hash: "  ".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_config_deserialize_defaults() {
        let json = r#"{"secret_key": "0123456789abcdef0123456789abcdef"}"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.algorithm, TokenAlgorithm::HS256);
        assert_eq!(config.access_token_expire_minutes, 720);
        assert!(config.admin.is_none());
    }

    #[test]
    fn test_token_algorithm_is_uppercase() {
        let alg: TokenAlgorithm = serde_json::from_str(r#""HS512""#).unwrap();
        assert_eq!(alg, TokenAlgorithm::HS512);
        assert!(serde_json::from_str::<TokenAlgorithm>(r#""RS256""#).is_err());
    }

    #[test]
    fn test_listing_clamp_limit() {
        let config = ListingConfig::default();
        assert_eq!(config.clamp_limit(None), 50);
        assert_eq!(config.clamp_limit(Some(10)), 10);
        assert_eq!(config.clamp_limit(Some(10_000)), 500);
        assert_eq!(config.clamp_limit(Some(0)), 0);
    }

    #[test]
    fn test_listing_validate_default_above_max() {
        let config = ListingConfig {
            default_limit: 100,
            max_limit: 10,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_zero_cleanup_interval_rejected() {
        let config = RateLimitConfig {
            enabled: true,
            cleanup_interval_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());

        let disabled = RateLimitConfig {
            enabled: false,
            cleanup_interval_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(disabled.validate().unwrap().is_empty());
    }

    #[test]
    fn test_rate_limit_wildcard_proxy_warns() {
        let config = RateLimitConfig {
            enabled: true,
            trusted_proxies: vec!["*".to_string()],
            ..RateLimitConfig::default()
        };
        assert_eq!(config.validate().unwrap().len(), 1);
    }

    #[test]
    fn test_metadata_config_tagged_sqlite() {
        let json = r#"{"type":"sqlite","path":"/tmp/p.db"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        let MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } = config;
        assert_eq!(path, PathBuf::from("/tmp/p.db"));
        assert_eq!(query_timeout_secs, Some(30));
    }

    #[test]
    fn test_app_config_for_testing_is_valid() {
        let config = AppConfig::for_testing();
        assert!(config.validate().unwrap().is_empty());
    }
}
