//! Admin identity initialization.

use anyhow::{Context, Result};
use certfolio_auth::Pbkdf2PasswordHasher;
use certfolio_core::config::AuthConfig;
use certfolio_core::validate;
use certfolio_metadata::MetadataStore;

/// Ensure the configured admin identity exists with the configured hash.
///
/// If the identity already exists with a different hash, the stored hash is
/// rotated. Without an `auth.admin` block this does nothing.
pub async fn ensure_admin_identity(metadata: &dyn MetadataStore, config: &AuthConfig) -> Result<()> {
    let Some(seed) = &config.admin else {
        tracing::debug!("No admin seed configured");
        return Ok(());
    };

    validate::username(&seed.username).context("invalid auth.admin.username")?;
    let hash = seed.password_hash.trim();
    Pbkdf2PasswordHasher::check_format(hash).context(
        "invalid auth.admin.password_hash; generate one with `certfoliod hash-password`",
    )?;

    match metadata.get_admin_by_username(&seed.username).await? {
        Some(existing) if existing.password_hash == hash => {
            tracing::debug!(admin_id = existing.admin_id, "Admin identity already exists");
        }
        Some(existing) => {
            metadata
                .update_admin_password(existing.admin_id, hash)
                .await?;
            tracing::info!(admin_id = existing.admin_id, "Admin password hash rotated");
        }
        None => {
            let admin = metadata.create_admin(&seed.username, hash).await?;
            tracing::info!(
                admin_id = admin.admin_id,
                username = %admin.username,
                "Admin identity created"
            );
        }
    }

    Ok(())
}
