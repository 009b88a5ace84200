//! Configuration management for archivist
//!
//! The whole configuration is loaded once at startup into an immutable
//! struct: TOML file plus environment fallbacks for secrets and URLs.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL connection URL (pgvector extension required)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Indexer run configuration
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Retrieval configuration (downstream nearest-neighbor queries)
    #[serde(default)]
    pub query: QueryConfig,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match the model and the stored schema)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Texts per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Base URL of the OpenAI-compatible embeddings endpoint
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key ("" = unauthenticated)
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum attempts per embedding batch before the file's action aborts
    #[serde(default = "default_embedding_max_attempts")]
    pub max_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            endpoint: default_embedding_endpoint(),
            api_key_env: default_embedding_api_key_env(),
            timeout_secs: default_embedding_timeout_secs(),
            max_attempts: default_embedding_max_attempts(),
        }
    }
}

impl EmbeddingConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env).ok()
    }
}

/// Indexer run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Local checkout of the content repository
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Git URL of the content repository ("" = skip sync, index in place)
    #[serde(default)]
    pub repo_url: String,

    /// Branch pulled on sync
    #[serde(default = "default_repo_branch")]
    pub repo_branch: String,

    /// Cron expression for scheduled runs
    #[serde(default = "default_cron_schedule")]
    pub cron_schedule: String,

    /// Glob patterns a file must match to be indexed (empty = all)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Glob patterns that exclude a file from indexing
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Minimum file size in bytes
    #[serde(default)]
    pub min_file_size: u64,

    /// Maximum file size in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            repo_url: String::new(),
            repo_branch: default_repo_branch(),
            cron_schedule: default_cron_schedule(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            min_file_size: 0,
            max_file_size: default_max_file_size(),
        }
    }
}

/// Chunking configuration (sizes are in words)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_target_chunk_words")]
    pub target_words: usize,

    #[serde(default = "default_max_chunk_words")]
    pub max_words: usize,

    /// Chunks below this word count are dropped
    #[serde(default = "default_min_chunk_words")]
    pub min_words: usize,

    /// Words carried over between adjacent chunks
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_words: default_target_chunk_words(),
            max_words: default_max_chunk_words(),
            min_words: default_min_chunk_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

/// Retrieval configuration for the downstream consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of nearest neighbors returned
    #[serde(default = "default_match_count")]
    pub match_count: usize,

    /// Minimum cosine similarity (0.0 - 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            match_count: default_match_count(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            embedding: EmbeddingConfig::default(),
            indexer: IndexerConfig::default(),
            chunk: ChunkConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, or defaults when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading config");
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be non-zero".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Config("embedding.batch_size must be non-zero".into()));
        }
        if self.embedding.max_attempts == 0 {
            return Err(Error::Config("embedding.max_attempts must be non-zero".into()));
        }
        if self.indexer.min_file_size > self.indexer.max_file_size {
            return Err(Error::Config(
                "indexer.min_file_size exceeds indexer.max_file_size".into(),
            ));
        }
        if self.chunk.target_words > self.chunk.max_words {
            return Err(Error::Config(
                "chunk.target_words exceeds chunk.max_words".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.chunk.target_words, 1000);
        assert_eq!(config.query.match_count, 5);
        assert!(config.indexer.include_patterns.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            [embedding]
            model = "text-embedding-3-small"
            batch_size = 64

            [indexer]
            include_patterns = ["main/**"]
            exclude_patterns = ["**/draft-*.md"]
            min_file_size = 100

            [query]
            match_count = 8
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.indexer.include_patterns, vec!["main/**"]);
        assert_eq!(config.indexer.min_file_size, 100);
        assert_eq!(config.query.match_count, 8);
        assert_eq!(config.chunk.max_words, 2500);
    }

    #[test]
    fn test_validate_rejects_inverted_sizes() {
        let mut config = Config::default();
        config.indexer.min_file_size = 10;
        config.indexer.max_file_size = 5;
        assert!(config.validate().is_err());
    }
}
