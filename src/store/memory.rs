//! In-memory index store
//!
//! Mirrors the PostgreSQL store's semantics behind the same trait, with
//! every `ReconcileOp` applied under one mutex guard. Used by the test
//! suite and by dry runs that should not touch a real database.

use super::{
    validate_dense_indices, IndexStore, ReconcileOp, SearchMatch, TableStats,
};
use crate::detect::HistorySnapshot;
use crate::error::{Error, Result};
use crate::models::{ActionKind, DocumentChunk, FileActionRecord, HistoryRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    /// doc_id -> chunk rows with embeddings, ordered by chunk index
    chunks: BTreeMap<String, Vec<(DocumentChunk, Vec<f32>)>>,
    /// file_path -> history record
    history: BTreeMap<String, HistoryRecord>,
    /// append-only audit log
    actions: Vec<FileActionRecord>,
    next_action_id: i64,
}

/// Index store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    run_locked: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn try_acquire_run_lock(&self) -> Result<bool> {
        Ok(self
            .run_locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }

    async fn release_run_lock(&self) -> Result<()> {
        self.run_locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn indexed_hashes(&self) -> Result<HistorySnapshot> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .history
            .iter()
            .map(|(path, record)| (path.clone(), record.content_hash.clone()))
            .collect())
    }

    async fn history_for(&self, file_path: &str) -> Result<Option<HistoryRecord>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.history.get(file_path).cloned())
    }

    async fn record_action(
        &self,
        file_path: &str,
        kind: ActionKind,
        content_hash: Option<&str>,
    ) -> Result<i64> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_action_id += 1;
        let id = tables.next_action_id;
        tables.actions.push(FileActionRecord {
            id,
            file_path: file_path.to_string(),
            action_type: kind,
            content_hash: content_hash.map(str::to_string),
            run_timestamp: Utc::now(),
            processed_at: None,
        });
        Ok(id)
    }

    async fn apply(&self, op: ReconcileOp) -> Result<()> {
        // All validation happens before the first table mutation; a failed
        // apply must leave no trace.
        validate_dense_indices(&op)?;
        let hash = match op.kind {
            ActionKind::Delete => None,
            ActionKind::Add | ActionKind::Modify => {
                Some(op.content_hash.clone().ok_or_else(|| {
                    Error::Consistency(format!("Missing content hash for '{}'", op.file_path))
                })?)
            }
        };

        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();

        if op.kind != ActionKind::Add {
            tables.chunks.remove(&op.doc_id);
        }
        if !op.chunks.is_empty() {
            let rows: Vec<(DocumentChunk, Vec<f32>)> = op
                .chunks
                .iter()
                .map(|e| (e.chunk.clone(), e.embedding.clone()))
                .collect();
            tables.chunks.insert(op.doc_id.clone(), rows);
        }

        if let Some(hash) = hash {
            tables
                .history
                .entry(op.file_path.clone())
                .and_modify(|record| {
                    record.content_hash = hash.clone();
                    record.last_modified = now;
                })
                .or_insert_with(|| HistoryRecord {
                    file_path: op.file_path.clone(),
                    content_hash: hash,
                    indexed_at: now,
                    last_modified: now,
                });
        } else {
            tables.history.remove(&op.file_path);
        }

        if let Some(action) = tables.actions.iter_mut().find(|a| a.id == op.action_id) {
            action.processed_at = Some(now);
        }

        Ok(())
    }

    async fn chunks_for_doc(&self, doc_id: &str) -> Result<Vec<DocumentChunk>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .chunks
            .get(doc_id)
            .map(|rows| rows.iter().map(|(chunk, _)| chunk.clone()).collect())
            .unwrap_or_default())
    }

    async fn recent_actions(&self, limit: i64) -> Result<Vec<FileActionRecord>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .actions
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn table_stats(&self) -> Result<TableStats> {
        let tables = self.tables.lock().unwrap();
        Ok(TableStats {
            total_chunks: tables.chunks.values().map(|rows| rows.len() as i64).sum(),
            total_documents: tables.chunks.len() as i64,
            indexed_files: tables.history.len() as i64,
        })
    }

    async fn search(
        &self,
        embedding: &[f32],
        match_count: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SearchMatch>> {
        let tables = self.tables.lock().unwrap();
        let mut matches: Vec<SearchMatch> = tables
            .chunks
            .values()
            .flatten()
            .filter_map(|(chunk, vector)| {
                let similarity = cosine_similarity(embedding, vector);
                if similarity >= similarity_threshold {
                    Some(SearchMatch {
                        chunk_id: chunk.chunk_id.clone(),
                        doc_id: chunk.doc_id.clone(),
                        heading: chunk.heading.clone(),
                        text: chunk.text.clone(),
                        similarity,
                    })
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(match_count);
        Ok(matches)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
