//! Metadata store trait and SQLite implementation.

use crate::error::MetadataResult;
use crate::repos::{CacheRepo, ChunkRepo, EventRepo, PackageRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: PackageRepo + ChunkRepo + CacheRepo + EventRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;

    #[async_trait]
    impl PackageRepo for SqliteStore {
        async fn upsert_package(&self, package: &PackageRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO packages (
                    name, version, integrity, cached_path, algorithm,
                    verified, verified_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(name, version) DO UPDATE SET
                    integrity = excluded.integrity,
                    cached_path = excluded.cached_path,
                    algorithm = excluded.algorithm,
                    verified = excluded.verified,
                    verified_at = excluded.verified_at
                "#,
            )
            .bind(&package.name)
            .bind(&package.version)
            .bind(&package.integrity)
            .bind(&package.cached_path)
            .bind(&package.algorithm)
            .bind(package.verified)
            .bind(package.verified_at)
            .bind(package.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_package(
            &self,
            name: &str,
            version: &str,
        ) -> MetadataResult<Option<PackageRow>> {
            let row = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE name = ? AND version = ?",
            )
            .bind(name)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn verified_cache_paths(&self) -> MetadataResult<Vec<String>> {
            let paths: Vec<String> =
                sqlx::query_scalar("SELECT cached_path FROM packages WHERE verified = 1")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(paths)
        }
    }

    #[async_trait]
    impl ChunkRepo for SqliteStore {
        async fn replace_chunks(&self, package: &str, chunks: &[ChunkRow]) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM chunks WHERE package_name = ?")
                .bind(package)
                .execute(&mut *tx)
                .await?;

            for chunk in chunks {
                sqlx::query(
                    r#"
                    INSERT INTO chunks (package_name, chunk_index, text, embedding, created_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.package_name)
                .bind(chunk.chunk_index)
                .bind(&chunk.text)
                .bind(&chunk.embedding)
                .bind(chunk.created_at)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn get_chunks(&self, package: &str) -> MetadataResult<Vec<ChunkRow>> {
            let rows = sqlx::query_as::<_, ChunkRow>(
                "SELECT * FROM chunks WHERE package_name = ? ORDER BY chunk_index",
            )
            .bind(package)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn embedded_chunks(&self) -> MetadataResult<Vec<ChunkRow>> {
            let rows = sqlx::query_as::<_, ChunkRow>(
                "SELECT * FROM chunks WHERE embedding IS NOT NULL ORDER BY package_name, chunk_index",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn lexical_search(
            &self,
            tokens: &[String],
            limit: u32,
        ) -> MetadataResult<Vec<ChunkRow>> {
            if tokens.is_empty() {
                return Ok(Vec::new());
            }

            // Tokens are caller-extracted alphanumeric words, matched as
            // substrings with instr() so LIKE wildcards cannot leak in.
            let clauses = vec!["instr(lower(text), ?) > 0"; tokens.len()].join(" OR ");
            let sql = format!(
                "SELECT * FROM chunks WHERE {clauses} ORDER BY package_name, chunk_index LIMIT ?"
            );

            let mut query = sqlx::query_as::<_, ChunkRow>(&sql);
            for token in tokens {
                query = query.bind(token.to_lowercase());
            }
            let rows = query.bind(limit).fetch_all(&self.pool).await?;
            Ok(rows)
        }

        async fn update_chunk_embedding(
            &self,
            package: &str,
            chunk_index: i64,
            embedding: &[u8],
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE chunks SET embedding = ? WHERE package_name = ? AND chunk_index = ?",
            )
            .bind(embedding)
            .bind(package)
            .bind(chunk_index)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(crate::MetadataError::NotFound(format!(
                    "chunk {package}#{chunk_index}"
                )));
            }
            Ok(())
        }

        async fn chunk_stats(&self) -> MetadataResult<ChunkStats> {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await?;
            let with_embedding: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL")
                    .fetch_one(&self.pool)
                    .await?;
            let packages: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT package_name FROM chunks ORDER BY package_name",
            )
            .fetch_all(&self.pool)
            .await?;

            Ok(ChunkStats {
                total_chunks: total as u64,
                chunks_with_embedding: with_embedding as u64,
                packages,
            })
        }
    }

    #[async_trait]
    impl CacheRepo for SqliteStore {
        async fn get_embedding(
            &self,
            text_digest: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<Vec<u8>>> {
            let row: Option<Vec<u8>> = sqlx::query_scalar(
                "SELECT embedding FROM embedding_cache WHERE text_digest = ? AND expires_at > ?",
            )
            .bind(text_digest)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn put_embedding(
            &self,
            text_digest: &str,
            embedding: &[u8],
            now: OffsetDateTime,
            expires_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO embedding_cache (text_digest, embedding, created_at, expires_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(text_digest) DO UPDATE SET
                    embedding = excluded.embedding,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(text_digest)
            .bind(embedding)
            .bind(now)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn fresh_embedding_count(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache WHERE expires_at > ?")
                    .bind(now)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }

        async fn get_response(
            &self,
            question_digest: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<String>> {
            let row: Option<String> = sqlx::query_scalar(
                "SELECT answer FROM response_cache WHERE question_digest = ? AND expires_at > ?",
            )
            .bind(question_digest)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn put_response(
            &self,
            question_digest: &str,
            answer: &str,
            now: OffsetDateTime,
            expires_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO response_cache (question_digest, answer, created_at, expires_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(question_digest) DO UPDATE SET
                    answer = excluded.answer,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(question_digest)
            .bind(answer)
            .bind(now)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn fresh_response_count(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM response_cache WHERE expires_at > ?")
                    .bind(now)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }

        async fn purge_expired(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let embeddings = sqlx::query("DELETE FROM embedding_cache WHERE expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await?;
            let responses = sqlx::query("DELETE FROM response_cache WHERE expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(embeddings.rows_affected() + responses.rows_affected())
        }
    }

    #[async_trait]
    impl EventRepo for SqliteStore {
        async fn append_event(&self, event: &NewSecurityEvent) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO security_events (
                    package_name, version, kind, observed_digest,
                    expected_digest, details, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.package_name)
            .bind(&event.version)
            .bind(event.kind.as_str())
            .bind(&event.observed_digest)
            .bind(&event.expected_digest)
            .bind(&event.details)
            .bind(event.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn recent_events(&self, limit: u32) -> MetadataResult<Vec<SecurityEventRow>> {
            let rows = sqlx::query_as::<_, SecurityEventRow>(
                "SELECT * FROM security_events ORDER BY event_id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn event_totals(&self) -> MetadataResult<EventTotals> {
            let rows: Vec<(String, i64)> =
                sqlx::query_as("SELECT kind, COUNT(*) FROM security_events GROUP BY kind")
                    .fetch_all(&self.pool)
                    .await?;

            let mut totals = EventTotals::default();
            for (kind, count) in rows {
                let count = count as u64;
                totals.total += count;
                match kind.as_str() {
                    "success" => totals.success += count,
                    "threat_detected" => totals.threats_detected += count,
                    "failure" => totals.failures += count,
                    _ => {}
                }
            }
            Ok(totals)
        }
    }
}

/// Schema DDL, idempotent via IF NOT EXISTS.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS packages (
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    integrity TEXT,
    cached_path TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    verified INTEGER NOT NULL DEFAULT 0,
    verified_at TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (name, version)
);
CREATE INDEX IF NOT EXISTS idx_packages_name ON packages(name);
CREATE INDEX IF NOT EXISTS idx_packages_cached_path ON packages(cached_path);

CREATE TABLE IF NOT EXISTS chunks (
    package_name TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB,
    created_at TEXT NOT NULL,
    PRIMARY KEY (package_name, chunk_index)
);
CREATE INDEX IF NOT EXISTS idx_chunks_package ON chunks(package_name);

CREATE TABLE IF NOT EXISTS embedding_cache (
    text_digest TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_embedding_cache_expires ON embedding_cache(expires_at);

CREATE TABLE IF NOT EXISTS response_cache (
    question_digest TEXT PRIMARY KEY,
    answer TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_response_cache_expires ON response_cache(expires_at);

CREATE TABLE IF NOT EXISTS security_events (
    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
    package_name TEXT NOT NULL,
    version TEXT NOT NULL,
    kind TEXT NOT NULL,
    observed_digest TEXT,
    expected_digest TEXT,
    details TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_security_events_created ON security_events(created_at);
"#;
