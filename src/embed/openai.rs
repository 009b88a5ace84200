//! OpenAI-compatible HTTP embedding backend

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            dimension: config.dimension,
            api_key: config.api_key(),
        })
    }

    fn validate(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        if let Some(mismatch) = embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }
}

/// Whether an HTTP status signals a retryable condition.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: &texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                Error::Transient(format!("Embedding request failed: {e}"))
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Embedding service returned {status}: {body}");
            return if is_transient_status(status) {
                Err(Error::Transient(message))
            } else {
                Err(Error::Embedding(message))
            };
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Embedding service returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        // The API may reorder entries; restore input order by index.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        self.validate(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{embed_in_batches, RetryPolicy, Sleeper};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn test_config(endpoint: &str, dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model: "test-model".to_string(),
            dimension,
            batch_size: 16,
            endpoint: endpoint.to_string(),
            api_key_env: String::new(),
            timeout_secs: 5,
            max_attempts: 3,
        }
    }

    fn vectors_body(count: usize, dimension: usize) -> serde_json::Value {
        let data: Vec<_> = (0..count)
            .map(|i| json!({"index": i, "embedding": vec![0.1_f32; dimension]}))
            .collect();
        json!({"data": data})
    }

    struct NoopSleeper;

    #[async_trait]
    impl Sleeper for NoopSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vectors_body(2, 4)))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri(), 4)).unwrap();
        let result = embedder.embed(vec!["a".into(), "b".into()]).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 4);
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri(), 4)).unwrap();
        let err = embedder.embed(vec!["a".into()]).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_bad_request_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri(), 4)).unwrap();
        let err = embedder.embed(vec!["a".into()]).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vectors_body(1, 3)))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri(), 4)).unwrap();
        let err = embedder.embed(vec!["a".into()]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    /// Responds 503 for the first two requests, then succeeds.
    struct FailTwice {
        counter: std::sync::atomic::AtomicU32,
        dimension: usize,
    }

    impl Respond for FailTwice {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let call = self
                .counter
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call < 2 {
                return ResponseTemplate::new(503);
            }
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
            ResponseTemplate::new(200).set_body_json(vectors_body(count, self.dimension))
        }
    }

    #[tokio::test]
    async fn test_retry_loop_recovers_against_real_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(FailTwice {
                counter: std::sync::atomic::AtomicU32::new(0),
                dimension: 4,
            })
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri(), 4)).unwrap();
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result = embed_in_batches(
            &embedder,
            &NoopSleeper,
            &policy,
            vec!["x".into(), "y".into()],
            16,
        )
        .await
        .unwrap();
        assert_eq!(result.len(), 2);
    }
}
