//! SQLite-backed [`VectorIndex`] implementation.
//!
//! One `records` table, vectors stored as little-endian f32 blobs.
//! Ranking happens in Rust: candidate vectors are loaded and scored by
//! cosine similarity against the query embedding.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::config::DbConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_one, vec_to_blob, Embedder};
use crate::models::SearchHit;

use super::VectorIndex;

/// Durable index stored in a single SQLite database (WAL mode).
pub struct SqliteIndex {
    pool: SqlitePool,
    embedder: Box<dyn Embedder>,
}

impl SqliteIndex {
    /// Connect to the configured database, creating it and its schema if
    /// missing, and wrap it with the given embedder.
    pub async fn open(config: &DbConfig, embedder: Box<dyn Embedder>) -> Result<Self> {
        let pool = connect(config).await?;
        init_schema(&pool).await?;
        Ok(Self { pool, embedder })
    }

    /// Close the underlying connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, id: &str, text: &str) -> Result<()> {
        let vector = embed_one(self.embedder.as_ref(), text).await?;
        let blob = vec_to_blob(&vector);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO records (id, text, embedding, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(text)
        .bind(&blob)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_one(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query("SELECT id, text, embedding FROM records")
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                SearchHit {
                    id: row.get("id"),
                    text: row.get("text"),
                    score: cosine_similarity(&query_vec, &vector),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(total as usize)
    }
}

pub async fn connect(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = &config.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the database file and schema without holding it open.
///
/// Used by `deck init`; safe to run repeatedly.
pub async fn init_db(config: &DbConfig) -> Result<()> {
    let pool = connect(config).await?;
    init_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(updated_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
