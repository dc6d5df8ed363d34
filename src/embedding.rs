//! Text embedding providers and vector math.

use crate::config::EmbeddingConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Turns text into fixed-width vectors. Implementations batch internally;
/// callers hand over every text in one call.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in order. Empty input yields an empty vec.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dims(&self) -> usize;
}

/// Cosine similarity between two vectors. Returns 0.0 for mismatched lengths
/// or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
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
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

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
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("embedding.model is required")?;
        let dims = config.dims.context("embedding.dims is required")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        })
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut attempt = 0u32;
        loop {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse =
                            resp.json().await.context("Failed to parse embedding response")?;
                        if parsed.data.len() != texts.len() {
                            bail!(
                                "Embedding response count mismatch: sent {}, got {}",
                                texts.len(),
                                parsed.data.len()
                            );
                        }
                        for item in &parsed.data {
                            if item.embedding.len() != self.dims {
                                bail!(
                                    "Embedding width mismatch: expected {}, got {}",
                                    self.dims,
                                    item.embedding.len()
                                );
                            }
                        }
                        return Ok(parsed.data.into_iter().map(|d| d.embedding).collect());
                    }

                    // Retry rate limits and server errors, fail fast on the rest.
                    if (status.as_u16() == 429 || status.is_server_error())
                        && attempt < self.max_retries
                    {
                        let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                        tracing::warn!(
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Embedding request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    let text = resp.text().await.unwrap_or_default();
                    bail!("Embedding request failed with {}: {}", status, text);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                        tracing::warn!(error = %e, attempt, "Embedding request error, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(e).context("Embedding request failed");
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.encode_batch(chunk).await?);
        }
        Ok(out)
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Placeholder embedder for configurations without a provider. Every call
/// fails so misconfiguration surfaces at the first ingest instead of silently
/// producing garbage vectors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled; set [embedding] provider in the config")
    }

    fn dims(&self) -> usize {
        0
    }
}

pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set when embedding provider is 'openai'")?;
            Ok(Arc::new(OpenAiEmbedder::new(config, api_key)?))
        }
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        other => bail!("Unknown embedding provider: '{}'", other),
    }
}
