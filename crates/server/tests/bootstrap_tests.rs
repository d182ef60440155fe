//! Integration tests for admin identity seeding.

use certfolio_auth::password::MIN_ITERATIONS;
use certfolio_auth::{PasswordHasher, Pbkdf2PasswordHasher};
use certfolio_core::config::{AdminSeedConfig, AuthConfig};
use certfolio_metadata::SqliteStore;
use certfolio_metadata::repos::AdminRepo;
use certfolio_server::bootstrap::ensure_admin_identity;
use tempfile::TempDir;

fn hasher() -> Pbkdf2PasswordHasher {
    Pbkdf2PasswordHasher::with_iterations(MIN_ITERATIONS).unwrap()
}

async fn store() -> (TempDir, SqliteStore) {
    let temp = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(temp.path().join("portfolio.db"), None)
        .await
        .unwrap();
    (temp, store)
}

fn seeded(username: &str, password: &str) -> AuthConfig {
    AuthConfig {
        admin: Some(AdminSeedConfig {
            username: username.to_string(),
            password_hash: hasher().hash(password).unwrap(),
        }),
        ..AuthConfig::for_testing()
    }
}

#[tokio::test]
async fn test_no_seed_is_noop() {
    let (_temp, store) = store().await;

    ensure_admin_identity(&store, &AuthConfig::for_testing())
        .await
        .unwrap();
    assert!(store.get_admin_by_username("admin").await.unwrap().is_none());
}

#[tokio::test]
async fn test_seed_creates_admin() {
    let (_temp, store) = store().await;
    let config = seeded("owner", "first-password");

    ensure_admin_identity(&store, &config).await.unwrap();

    let admin = store.get_admin_by_username("owner").await.unwrap().unwrap();
    let hasher = hasher();
    assert!(hasher.verify("first-password", &admin.password_hash).unwrap());
}

#[tokio::test]
async fn test_seed_is_idempotent() {
    let (_temp, store) = store().await;
    let config = seeded("owner", "first-password");

    ensure_admin_identity(&store, &config).await.unwrap();
    let first = store.get_admin_by_username("owner").await.unwrap().unwrap();

    ensure_admin_identity(&store, &config).await.unwrap();
    let second = store.get_admin_by_username("owner").await.unwrap().unwrap();

    assert_eq!(first.admin_id, second.admin_id);
    assert_eq!(first.password_hash, second.password_hash);
}

#[tokio::test]
async fn test_changed_hash_rotates_password() {
    let (_temp, store) = store().await;

    ensure_admin_identity(&store, &seeded("owner", "first-password"))
        .await
        .unwrap();
    ensure_admin_identity(&store, &seeded("owner", "second-password"))
        .await
        .unwrap();

    let admin = store.get_admin_by_username("owner").await.unwrap().unwrap();
    let hasher = hasher();
    assert!(hasher.verify("second-password", &admin.password_hash).unwrap());
    assert!(!hasher.verify("first-password", &admin.password_hash).unwrap());
}

#[tokio::test]
async fn test_malformed_hash_fails_startup() {
    let (_temp, store) = store().await;
    let config = AuthConfig {
        admin: Some(AdminSeedConfig {
            username: "owner".to_string(),
            password_hash: "plaintext-password".to_string(),
        }),
        ..AuthConfig::for_testing()
    };

    assert!(ensure_admin_identity(&store, &config).await.is_err());
    assert!(store.get_admin_by_username("owner").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unstretched_or_weak_hash_fails_startup() {
    let (_temp, store) = store().await;
    let weak = hasher()
        .hash("first-password")
        .unwrap()
        .replace("$i=10000$", "$i=1000$");

    for password_hash in ["sha256$00$00".to_string(), weak] {
        let config = AuthConfig {
            admin: Some(AdminSeedConfig {
                username: "owner".to_string(),
                password_hash,
            }),
            ..AuthConfig::for_testing()
        };
        assert!(ensure_admin_identity(&store, &config).await.is_err());
    }
    assert!(store.get_admin_by_username("owner").await.unwrap().is_none());
}
