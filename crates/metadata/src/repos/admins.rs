//! Admin identity repository.

use crate::error::MetadataResult;
use crate::models::AdminRow;
use async_trait::async_trait;

/// Repository for admin identities (the credential store).
#[async_trait]
pub trait AdminRepo: Send + Sync {
    /// Look up an admin by exact, case-sensitive username.
    async fn get_admin_by_username(&self, username: &str) -> MetadataResult<Option<AdminRow>>;

    /// Look up an admin by ID.
    async fn get_admin(&self, admin_id: i64) -> MetadataResult<Option<AdminRow>>;

    /// Create an admin. Fails with `AlreadyExists` on a duplicate username.
    async fn create_admin(&self, username: &str, password_hash: &str) -> MetadataResult<AdminRow>;

    /// Replace an admin's password hash.
    async fn update_admin_password(&self, admin_id: i64, password_hash: &str)
    -> MetadataResult<()>;
}
