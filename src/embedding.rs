//! Embedding collaborator abstraction plus vector utilities.
//!
//! The [`Embedder`] trait is the seam to the external embedding model: text
//! in, fixed-dimensionality vector out. [`OpenAiEmbedder`] calls the OpenAI
//! embeddings API over HTTPS. Each call is a single attempt — transient
//! faults are surfaced as retryable [`Error::EmbeddingUnavailable`] and left
//! to the whole-run backoff policy in [`crate::agent`].
//!
//! Also provides the vector plumbing shared by the cache and the store:
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 encoding for
//!   SQLite BLOB columns
//! - [`cosine_distance`] — the retrieval distance metric

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// External embedding model: send text, get back one vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, part of the cache key.
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one text. Never retries internally.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedding provider backed by the OpenAI embeddings endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable. The base URL is
/// configurable for OpenAI-compatible gateways.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::EmbeddingUnavailable {
                message: e.to_string(),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingUnavailable {
                message: format!("HTTP {}: {}", status, detail),
                retryable: status.as_u16() == 429 || status.is_server_error(),
            });
        }

        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| Error::EmbeddingUnavailable {
                    message: format!("invalid response body: {}", e),
                    retryable: false,
                })?;

        parse_embedding_response(&json)
    }
}

/// Extract `data[0].embedding` from the API response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::EmbeddingUnavailable {
            message: "response missing data[0].embedding".into(),
            retryable: false,
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine distance: `1 − cos(a, b)`, so smaller means more similar.
///
/// Empty or mismatched vectors yield the maximum distance `1.0` rather than
/// an error; such pairs simply never rank as relevant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b) as f64
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
