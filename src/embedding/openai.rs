//! OpenAI-compatible embeddings API (`POST {base}/embeddings`).
//!
//! Works against OpenAI and any server exposing the same endpoint shape.
//! Batches go out as one request; results are reordered by `index`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, http_client, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Output dimension per model. Unknown models are assumed to match
/// `text-embedding-3-small`.
pub fn dimension_for(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a, I: Serialize> {
    model: &'a str,
    input: I,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    name: String,
    dimension: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::InvalidInput("openai provider needs an API key (OPENAI_API_KEY)".into()))?;
        let model = super::remote_model(config, DEFAULT_MODEL);
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        Ok(Self {
            client: http_client()?,
            endpoint: format!("{}/embeddings", base.trim_end_matches('/')),
            api_key,
            name: format!("openai/{model}"),
            dimension: dimension_for(&model),
            model,
        })
    }

    async fn request<I: Serialize + Send + Sync>(&self, input: I) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            })
            .send()
            .await?;
        let body = check_status(response, "openai").await?.text().await?;
        let mut parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("malformed embeddings response: {e}")))?;

        parsed.data.sort_by_key(|d| d.index);
        parsed
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() == self.dimension {
                    Ok(d.embedding)
                } else {
                    Err(Error::DimensionMismatch {
                        expected: self.dimension,
                        actual: d.embedding.len(),
                    })
                }
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Parse("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let vectors = self.request(texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    async fn is_available(&self) -> bool {
        self.request("test").await.is_ok()
    }
}
