//! Embedding generation
//!
//! An `Embedder` trait abstracts the external embedding service; the
//! production backend talks to an OpenAI-compatible HTTP endpoint.
//! Transient failures are retried with exponential backoff through an
//! injected `Sleeper`, so the retry loop is testable without real waits.

mod openai;

pub use openai::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Sleep abstraction so retry timing can be observed in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded-attempt retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }

    /// Backoff before attempt `attempt` (1-based; no delay before the first).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.max_delay)
    }
}

/// Create an embedder from configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(OpenAiEmbedder::new(config)?))
}

/// Embed texts in batches, retrying transient failures per batch.
///
/// Either every batch succeeds or the whole call fails; partial results
/// are never returned, keeping per-file reconciliation all-or-nothing.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut all_embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let embeddings = embed_with_retry(embedder, sleeper, policy, batch.to_vec()).await?;
        if embeddings.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "Embedding count mismatch: sent {}, received {}",
                batch.len(),
                embeddings.len()
            )));
        }
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}

async fn embed_with_retry(
    embedder: &dyn Embedder,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    let mut attempt = 1u32;
    loop {
        match embedder.embed(texts.clone()).await {
            Ok(embeddings) => {
                debug!(attempt, batch = texts.len(), "Embedding batch succeeded");
                return Ok(embeddings);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient embedding failure, retrying: {e}"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
