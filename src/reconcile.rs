//! Per-file reconciliation
//!
//! Takes one classified `FileChange` from detection to a committed store
//! state. Embeddings are generated before the store transaction opens, so
//! a failed embedding call leaves both the chunk table and the indexing
//! history untouched and the audit row unprocessed. The next run then
//! re-detects the same change and retries it.

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::document::load_document;
use crate::embed::{embed_in_batches, Embedder, RetryPolicy, Sleeper};
use crate::error::{Error, Result};
use crate::models::{ActionKind, FileChange};
use crate::stats::{chunk_stats, ChunkStats};
use crate::store::{EmbeddedChunk, IndexStore, ReconcileOp};
use tracing::{debug, info};

/// Result of reconciling one file.
#[derive(Debug, Clone, Default)]
pub struct FileOutcome {
    pub stats: ChunkStats,
}

/// Reconcile one classified change against the store.
///
/// The audit row is appended before any work happens and only marked
/// processed by the store when the apply commits.
pub async fn reconcile_change(
    store: &dyn IndexStore,
    embedder: &dyn Embedder,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    config: &Config,
    change: &FileChange,
) -> Result<FileOutcome> {
    let action_id = store
        .record_action(&change.file_path, change.kind, change.content_hash.as_deref())
        .await?;
    let doc_id = change.doc_id();

    let chunks = match change.kind {
        ActionKind::Delete => Vec::new(),
        ActionKind::Add | ActionKind::Modify => {
            let document = load_document(&config.indexer.content_dir, &change.file_path)?;
            chunk_document(&document, &config.chunk)
        }
    };

    if chunks.is_empty() && change.kind != ActionKind::Delete {
        debug!(file = %change.file_path, "Document produced no chunks");
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embed_in_batches(
        embedder,
        sleeper,
        policy,
        texts,
        config.embedding.batch_size,
    )
    .await?;
    if embeddings.len() != chunks.len() {
        return Err(Error::Embedding(format!(
            "Got {} embeddings for {} chunks of '{}'",
            embeddings.len(),
            chunks.len(),
            change.file_path
        )));
    }

    let outcome = FileOutcome {
        stats: chunk_stats(&chunks, config.embedding.batch_size),
    };

    let embedded: Vec<EmbeddedChunk> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
        .collect();

    store
        .apply(ReconcileOp {
            action_id,
            file_path: change.file_path.clone(),
            doc_id: doc_id.clone(),
            kind: change.kind,
            content_hash: change.content_hash.clone(),
            chunks: embedded,
        })
        .await?;

    info!(
        file = %change.file_path,
        action = %change.kind,
        chunks = outcome.stats.total_chunks,
        "File reconciled"
    );
    Ok(outcome)
}
