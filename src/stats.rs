//! Chunk statistics
//!
//! Aggregates over a chunk set, used for run summaries and for estimating
//! embedding API usage before a large reindex.

use crate::models::DocumentChunk;
use std::collections::BTreeSet;

/// Aggregate statistics for a set of chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_words: i64,
    pub avg_words: f64,
    pub min_words: i32,
    pub max_words: i32,
    /// Embedding requests needed at the given batch size
    pub estimated_api_calls: usize,
}

impl ChunkStats {
    /// Fold another stats block into this one. Averages are recomputed from
    /// the merged totals; API calls add up because embedding is batched per
    /// file.
    pub fn merge(&mut self, other: &ChunkStats) {
        if other.total_chunks == 0 {
            return;
        }
        if self.total_chunks == 0 {
            *self = other.clone();
            return;
        }
        self.total_documents += other.total_documents;
        self.total_chunks += other.total_chunks;
        self.total_words += other.total_words;
        self.min_words = self.min_words.min(other.min_words);
        self.max_words = self.max_words.max(other.max_words);
        self.avg_words = self.total_words as f64 / self.total_chunks as f64;
        self.estimated_api_calls += other.estimated_api_calls;
    }
}

/// Compute statistics over `chunks` for the given embedding batch size.
pub fn chunk_stats(chunks: &[DocumentChunk], batch_size: usize) -> ChunkStats {
    if chunks.is_empty() {
        return ChunkStats::default();
    }

    let documents: BTreeSet<&str> = chunks.iter().map(|c| c.doc_id.as_str()).collect();
    let total_words: i64 = chunks.iter().map(|c| c.word_count as i64).sum();
    let min_words = chunks.iter().map(|c| c.word_count).min().unwrap_or(0);
    let max_words = chunks.iter().map(|c| c.word_count).max().unwrap_or(0);

    ChunkStats {
        total_documents: documents.len(),
        total_chunks: chunks.len(),
        total_words,
        avg_words: total_words as f64 / chunks.len() as f64,
        min_words,
        max_words,
        estimated_api_calls: chunks.len().div_ceil(batch_size.max(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc_id: &str, index: i32, words: i32) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("{doc_id}_chunk_{index:03}"),
            doc_id: doc_id.to_string(),
            chunk_index: index,
            heading: None,
            text: String::new(),
            word_count: words,
        }
    }

    #[test]
    fn test_stats_over_two_documents() {
        let chunks = vec![
            chunk("a", 0, 100),
            chunk("a", 1, 300),
            chunk("b", 0, 200),
        ];
        let stats = chunk_stats(&chunks, 2);
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.total_words, 600);
        assert_eq!(stats.avg_words, 200.0);
        assert_eq!(stats.min_words, 100);
        assert_eq!(stats.max_words, 300);
        assert_eq!(stats.estimated_api_calls, 2);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(chunk_stats(&[], 100), ChunkStats::default());
    }

    #[test]
    fn test_merge_recomputes_aggregates() {
        let mut a = chunk_stats(&[chunk("a", 0, 100), chunk("a", 1, 200)], 100);
        let b = chunk_stats(&[chunk("b", 0, 400)], 100);
        a.merge(&b);
        assert_eq!(a.total_documents, 2);
        assert_eq!(a.total_chunks, 3);
        assert_eq!(a.total_words, 700);
        assert_eq!(a.min_words, 100);
        assert_eq!(a.max_words, 400);
        assert_eq!(a.estimated_api_calls, 2);

        a.merge(&ChunkStats::default());
        assert_eq!(a.total_chunks, 3);
    }

    #[test]
    fn test_api_calls_round_up() {
        let chunks: Vec<_> = (0..101).map(|i| chunk("a", i, 10)).collect();
        assert_eq!(chunk_stats(&chunks, 100).estimated_api_calls, 2);
    }
}
