//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AdminRepo, CertificateRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Default advisory query timeout when none is configured.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: AdminRepo + CertificateRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection serializes writers and avoids "database is locked".
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout: Duration::from_secs(query_timeout_secs),
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs,
            "Opened SQLite metadata store"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run a query, warning when it exceeds the advisory timeout.
    /// SQLite cannot cancel statements, so the query is never aborted.
    async fn timed<T>(
        &self,
        operation: &'static str,
        query: impl Future<Output = MetadataResult<T>>,
    ) -> MetadataResult<T> {
        let started = Instant::now();
        let result = query.await;
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "Metadata query exceeded advisory timeout"
            );
        }
        result
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Turn a user filter into a LIKE pattern with `\` as the escape character.
/// Returns `None` for blank filters.
fn like_pattern(raw: Option<&str>) -> Option<String> {
    let trimmed = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let mut pattern = String::with_capacity(trimmed.len() + 2);
    pattern.push('%');
    for c in trimmed.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use sqlx::QueryBuilder;
    use time::OffsetDateTime;

    #[async_trait]
    impl AdminRepo for SqliteStore {
        async fn get_admin_by_username(&self, username: &str) -> MetadataResult<Option<AdminRow>> {
            let row = sqlx::query_as::<_, AdminRow>("SELECT * FROM admins WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_admin(&self, admin_id: i64) -> MetadataResult<Option<AdminRow>> {
            let row = sqlx::query_as::<_, AdminRow>("SELECT * FROM admins WHERE admin_id = ?")
                .bind(admin_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn create_admin(
            &self,
            username: &str,
            password_hash: &str,
        ) -> MetadataResult<AdminRow> {
            let result = sqlx::query_as::<_, AdminRow>(
                "INSERT INTO admins (username, password_hash, created_at) VALUES (?, ?, ?) RETURNING *",
            )
            .bind(username)
            .bind(password_hash)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(row) => Ok(row),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                    MetadataError::AlreadyExists(format!("admin '{username}' already exists")),
                ),
                Err(e) => Err(e.into()),
            }
        }

        async fn update_admin_password(
            &self,
            admin_id: i64,
            password_hash: &str,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE admins SET password_hash = ? WHERE admin_id = ?")
                .bind(password_hash)
                .bind(admin_id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "admin_id {admin_id} not found"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CertificateRepo for SqliteStore {
        async fn insert_certificate(
            &self,
            cert: &NewCertificate,
        ) -> MetadataResult<CertificateRow> {
            self.timed("insert_certificate", async {
                let row = sqlx::query_as::<_, CertificateRow>(
                    "INSERT INTO certificates \
                     (title, issuer, issue_date, expiry_date, credential_id, verify_url, tags, image_path, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
                )
                .bind(&cert.title)
                .bind(&cert.issuer)
                .bind(cert.issue_date)
                .bind(cert.expiry_date)
                .bind(&cert.credential_id)
                .bind(&cert.verify_url)
                .bind(&cert.tags)
                .bind(&cert.image_path)
                .bind(OffsetDateTime::now_utc())
                .fetch_one(&self.pool)
                .await?;
                Ok(row)
            })
            .await
        }

        async fn get_certificate(
            &self,
            certificate_id: i64,
        ) -> MetadataResult<Option<CertificateRow>> {
            let row = sqlx::query_as::<_, CertificateRow>(
                "SELECT * FROM certificates WHERE certificate_id = ?",
            )
            .bind(certificate_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_certificates(
            &self,
            filter: &CertificateFilter,
        ) -> MetadataResult<Vec<CertificateRow>> {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM certificates WHERE 1 = 1");

            let filters = [
                ("issuer", like_pattern(filter.issuer.as_deref())),
                ("tags", like_pattern(filter.tag.as_deref())),
                ("title", like_pattern(filter.q.as_deref())),
            ];
            for (column, pattern) in filters {
                if let Some(pattern) = pattern {
                    qb.push(" AND ")
                        .push(column)
                        .push(" LIKE ")
                        .push_bind(pattern)
                        .push(" ESCAPE '\\'");
                }
            }

            qb.push(" ORDER BY certificate_id DESC LIMIT ")
                .push_bind(i64::from(filter.limit))
                .push(" OFFSET ")
                .push_bind(i64::from(filter.skip));

            self.timed("list_certificates", async {
                let rows = qb
                    .build_query_as::<CertificateRow>()
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            })
            .await
        }

        async fn update_certificate(
            &self,
            certificate_id: i64,
            patch: &CertificatePatch,
        ) -> MetadataResult<CertificateRow> {
            self.timed("update_certificate", async {
                let mut tx = self.pool.begin().await?;

                let mut row = sqlx::query_as::<_, CertificateRow>(
                    "SELECT * FROM certificates WHERE certificate_id = ?",
                )
                .bind(certificate_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    MetadataError::NotFound(format!("certificate {certificate_id} not found"))
                })?;

                if patch.is_empty() {
                    tx.commit().await?;
                    return Ok(row);
                }
                patch.apply(&mut row);

                let updated = sqlx::query_as::<_, CertificateRow>(
                    "UPDATE certificates SET title = ?, issuer = ?, issue_date = ?, expiry_date = ?, \
                     credential_id = ?, verify_url = ?, tags = ?, image_path = ? \
                     WHERE certificate_id = ? RETURNING *",
                )
                .bind(&row.title)
                .bind(&row.issuer)
                .bind(row.issue_date)
                .bind(row.expiry_date)
                .bind(&row.credential_id)
                .bind(&row.verify_url)
                .bind(&row.tags)
                .bind(&row.image_path)
                .bind(certificate_id)
                .fetch_one(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(updated)
            })
            .await
        }

        async fn delete_certificate(&self, certificate_id: i64) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM certificates WHERE certificate_id = ?")
                .bind(certificate_id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "certificate {certificate_id} not found"
                )));
            }
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Admin identities
CREATE TABLE IF NOT EXISTS admins (
    admin_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Certificate records; image_path is the attachment key in the object store
CREATE TABLE IF NOT EXISTS certificates (
    certificate_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    issuer TEXT NOT NULL,
    issue_date TEXT NOT NULL,
    expiry_date TEXT,
    credential_id TEXT,
    verify_url TEXT,
    tags TEXT,
    image_path TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_certificates_issuer ON certificates(issuer);
"#;
