//! Vector store access
//!
//! The `IndexStore` trait owns every write to `document_chunks`,
//! `indexing_history`, and `file_actions`. One classified file action is
//! applied through a single `ReconcileOp`, and implementations must make
//! that application atomic: a failed apply leaves no trace, so the dense
//! chunk-index invariant holds after every successful reconciliation.

pub mod memory;
mod postgres;
mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use schema::schema_sql;

use crate::detect::HistorySnapshot;
use crate::error::{Error, Result};
use crate::models::{ActionKind, DocumentChunk, FileActionRecord, HistoryRecord};
use async_trait::async_trait;
use serde::Serialize;

/// A chunk paired with its embedding vector, ready for insertion.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

/// Everything needed to reconcile one file action atomically.
#[derive(Debug, Clone)]
pub struct ReconcileOp {
    /// Audit row appended when the action was classified
    pub action_id: i64,
    pub file_path: String,
    pub doc_id: String,
    pub kind: ActionKind,
    /// New content hash; `None` only for DELETE
    pub content_hash: Option<String>,
    /// Replacement chunk set; empty for DELETE and degenerate documents
    pub chunks: Vec<EmbeddedChunk>,
}

/// Aggregate row counts for status reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableStats {
    pub total_chunks: i64,
    pub total_documents: i64,
    pub indexed_files: i64,
}

/// One nearest-neighbor search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub chunk_id: String,
    pub doc_id: String,
    pub heading: Option<String>,
    pub text: String,
    pub similarity: f32,
}

/// Persistent store for chunks, indexing history, and the action audit log.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Acquire the advisory run lock. Returns false when another run holds it.
    async fn try_acquire_run_lock(&self) -> Result<bool>;

    /// Release the advisory run lock.
    async fn release_run_lock(&self) -> Result<()>;

    /// Snapshot of the indexing history: file path -> last content hash.
    async fn indexed_hashes(&self) -> Result<HistorySnapshot>;

    /// History record for one file path.
    async fn history_for(&self, file_path: &str) -> Result<Option<HistoryRecord>>;

    /// Append an audit row with `processed_at` unset; returns its id.
    async fn record_action(
        &self,
        file_path: &str,
        kind: ActionKind,
        content_hash: Option<&str>,
    ) -> Result<i64>;

    /// Apply one reconcile operation atomically: replace the document's
    /// chunk set, update or delete its history record, and mark the audit
    /// row processed.
    async fn apply(&self, op: ReconcileOp) -> Result<()>;

    /// All stored chunks for a document, ordered by chunk index.
    async fn chunks_for_doc(&self, doc_id: &str) -> Result<Vec<DocumentChunk>>;

    /// Most recent audit entries, newest first.
    async fn recent_actions(&self, limit: i64) -> Result<Vec<FileActionRecord>>;

    /// Aggregate table statistics.
    async fn table_stats(&self) -> Result<TableStats>;

    /// Cosine nearest-neighbor search over stored chunk embeddings.
    async fn search(
        &self,
        embedding: &[f32],
        match_count: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SearchMatch>>;
}

/// Reject operations whose chunk indices are not exactly 0..n-1.
pub(crate) fn validate_dense_indices(op: &ReconcileOp) -> Result<()> {
    for (expected, embedded) in op.chunks.iter().enumerate() {
        if embedded.chunk.chunk_index != expected as i32 {
            return Err(Error::Consistency(format!(
                "Chunk indices for '{}' are not dense: expected {}, found {}",
                op.doc_id, expected, embedded.chunk.chunk_index
            )));
        }
        if embedded.chunk.doc_id != op.doc_id {
            return Err(Error::Consistency(format!(
                "Chunk '{}' belongs to '{}', not '{}'",
                embedded.chunk.chunk_id, embedded.chunk.doc_id, op.doc_id
            )));
        }
    }
    Ok(())
}

/// Render an embedding as a pgvector literal: `[0.1,0.2,...]`.
pub(crate) fn vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 10 + 2);
    out.push('[');
    for (i, v) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}
