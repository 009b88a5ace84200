//! PostgreSQL + pgvector implementation of the index store

use super::{
    schema_sql, validate_dense_indices, vector_literal, IndexStore, ReconcileOp, SearchMatch,
    TableStats,
};
use crate::config::Config;
use crate::detect::HistorySnapshot;
use crate::error::{Error, Result};
use crate::models::{ActionKind, DocumentChunk, FileActionRecord, HistoryRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Row};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Advisory lock key shared by every archivist instance on one database.
const RUN_LOCK_KEY: i64 = 0x4152_4348_5f52_554e; // "ARCH_RUN"

/// Index store backed by PostgreSQL with the pgvector extension.
pub struct PgStore {
    pool: PgPool,
    // Advisory locks are session-scoped, so the locking connection is
    // pinned here until release.
    lock_conn: Mutex<Option<PoolConnection<Postgres>>>,
}

impl PgStore {
    /// Connect to the database configured in `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        debug!("Connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;
        Ok(Self {
            pool,
            lock_conn: Mutex::new(None),
        })
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn init_schema(&self, dimension: usize) -> Result<()> {
        info!(dimension, "Initializing database schema");
        sqlx::raw_sql(&schema_sql(dimension)).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl IndexStore for PgStore {
    async fn try_acquire_run_lock(&self) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(RUN_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await?;
        if locked {
            *self.lock_conn.lock().await = Some(conn);
        }
        Ok(locked)
    }

    async fn release_run_lock(&self) -> Result<()> {
        if let Some(mut conn) = self.lock_conn.lock().await.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(RUN_LOCK_KEY)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    async fn indexed_hashes(&self) -> Result<HistorySnapshot> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT file_path, content_hash FROM indexing_history")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn history_for(&self, file_path: &str) -> Result<Option<HistoryRecord>> {
        let row: Option<(String, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT file_path, content_hash, indexed_at, last_modified \
             FROM indexing_history WHERE file_path = $1",
        )
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(file_path, content_hash, indexed_at, last_modified)| HistoryRecord {
            file_path,
            content_hash,
            indexed_at,
            last_modified,
        }))
    }

    async fn record_action(
        &self,
        file_path: &str,
        kind: ActionKind,
        content_hash: Option<&str>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO file_actions (file_path, action_type, content_hash) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(file_path)
        .bind(kind.to_string())
        .bind(content_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn apply(&self, op: ReconcileOp) -> Result<()> {
        validate_dense_indices(&op)?;

        let mut tx = self.pool.begin().await?;

        // Replace the whole chunk set: a MODIFY never leaves stale rows
        // behind, and the dense 0..n-1 sequence is preserved.
        if op.kind != ActionKind::Add {
            sqlx::query("DELETE FROM document_chunks WHERE doc_id = $1")
                .bind(&op.doc_id)
                .execute(&mut *tx)
                .await?;
        }

        for embedded in &op.chunks {
            let chunk = &embedded.chunk;
            sqlx::query(
                "INSERT INTO document_chunks \
                 (chunk_id, doc_id, chunk_index, heading, text, word_count, embedding) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7::vector)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.doc_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.heading)
            .bind(&chunk.text)
            .bind(chunk.word_count)
            .bind(vector_literal(&embedded.embedding))
            .execute(&mut *tx)
            .await?;
        }

        match op.kind {
            ActionKind::Add | ActionKind::Modify => {
                let hash = op.content_hash.as_deref().ok_or_else(|| {
                    Error::Consistency(format!("Missing content hash for '{}'", op.file_path))
                })?;
                sqlx::query(
                    "INSERT INTO indexing_history (file_path, content_hash) \
                     VALUES ($1, $2) \
                     ON CONFLICT (file_path) DO UPDATE SET \
                         content_hash = EXCLUDED.content_hash, \
                         last_modified = CURRENT_TIMESTAMP",
                )
                .bind(&op.file_path)
                .bind(hash)
                .execute(&mut *tx)
                .await?;
            }
            ActionKind::Delete => {
                sqlx::query("DELETE FROM indexing_history WHERE file_path = $1")
                    .bind(&op.file_path)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("UPDATE file_actions SET processed_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(op.action_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(
            file = %op.file_path,
            action = %op.kind,
            chunks = op.chunks.len(),
            "Reconciled"
        );
        Ok(())
    }

    async fn chunks_for_doc(&self, doc_id: &str) -> Result<Vec<DocumentChunk>> {
        let rows: Vec<(String, String, i32, Option<String>, String, i32)> = sqlx::query_as(
            "SELECT chunk_id, doc_id, chunk_index, heading, text, word_count \
             FROM document_chunks WHERE doc_id = $1 ORDER BY chunk_index",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(chunk_id, doc_id, chunk_index, heading, text, word_count)| DocumentChunk {
                    chunk_id,
                    doc_id,
                    chunk_index,
                    heading,
                    text,
                    word_count,
                },
            )
            .collect())
    }

    async fn recent_actions(&self, limit: i64) -> Result<Vec<FileActionRecord>> {
        let rows = sqlx::query(
            "SELECT id, file_path, action_type, content_hash, run_timestamp, processed_at \
             FROM file_actions ORDER BY run_timestamp DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(FileActionRecord {
                    id: row.try_get("id")?,
                    file_path: row.try_get("file_path")?,
                    action_type: ActionKind::from_str(row.try_get::<String, _>("action_type")?.as_str())?,
                    content_hash: row.try_get("content_hash")?,
                    run_timestamp: row.try_get("run_timestamp")?,
                    processed_at: row.try_get("processed_at")?,
                })
            })
            .collect()
    }

    async fn table_stats(&self) -> Result<TableStats> {
        let (total_chunks, total_documents): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT doc_id) FROM document_chunks",
        )
        .fetch_one(&self.pool)
        .await?;
        let indexed_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indexing_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(TableStats {
            total_chunks,
            total_documents,
            indexed_files,
        })
    }

    async fn search(
        &self,
        embedding: &[f32],
        match_count: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SearchMatch>> {
        let literal = vector_literal(embedding);
        let rows: Vec<(String, String, Option<String>, String, f64)> = sqlx::query_as(
            "SELECT chunk_id, doc_id, heading, text, \
                    1 - (embedding <=> $1::vector) AS similarity \
             FROM document_chunks \
             WHERE 1 - (embedding <=> $1::vector) >= $2 \
             ORDER BY embedding <=> $1::vector \
             LIMIT $3",
        )
        .bind(&literal)
        .bind(similarity_threshold as f64)
        .bind(match_count as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(chunk_id, doc_id, heading, text, similarity)| SearchMatch {
                chunk_id,
                doc_id,
                heading,
                text,
                similarity: similarity as f32,
            })
            .collect())
    }
}
