//! Ollama embeddings (`POST /api/embeddings`). No native batch endpoint, so
//! batches fall back to one request per text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, http_client, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "nomic-embed-text";

pub fn dimension_for(model: &str) -> usize {
    match model {
        "mxbai-embed-large" => 1024,
        "all-minilm" => 384,
        _ => 768,
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    name: String,
    dimension: usize,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = super::remote_model(config, DEFAULT_MODEL);
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: http_client()?,
            base_url,
            name: format!("ollama/{model}"),
            dimension: dimension_for(&model),
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;
        let body = check_status(response, "ollama").await?.text().await?;
        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("malformed ollama response: {e}")))?;

        if parsed.embedding.is_empty() {
            return Err(Error::Parse("ollama returned an empty embedding".into()));
        }
        if parsed.embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }

    async fn is_available(&self) -> bool {
        match self.client.get(format!("{}/api/tags", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "ollama health probe failed");
                false
            }
        }
    }
}
