//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and three backends: a local
//! all-MiniLM-L6-v2 model run through ONNX Runtime ([`local`]), an
//! OpenAI-compatible HTTP API ([`openai`]) and Ollama ([`ollama`]).
//! The provider is created via [`create_provider`] from configuration.

pub mod assets;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod tokenizer;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Trait for embedding text into vectors.
///
/// Every vector a provider returns has exactly [`dimension`](Self::dimension)
/// components. Network and inference failures propagate as [`Error`];
/// [`is_available`](Self::is_available) never fails.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider identifier, e.g. `local/all-MiniLM-L6-v2`.
    fn name(&self) -> &str;

    /// Number of dimensions this provider produces. Fixed per provider+model.
    fn dimension(&self) -> usize;

    /// Prepare the backend (load or download a model). Idempotent; providers
    /// with nothing to prepare keep the default.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, one request per item unless overridden.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Cheap health probe.
    async fn is_available(&self) -> bool;
}

/// Create an embedding provider from config.
///
/// Returns `Ok(None)` for provider `none`, which leaves the engine in
/// keyword-only mode.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "none" | "" => return Ok(None),
        "local" => Arc::new(local::LocalEmbeddingProvider::new(config)),
        "openai" => Arc::new(openai::OpenAiEmbeddingProvider::new(config)?),
        "ollama" => Arc::new(ollama::OllamaEmbeddingProvider::new(config)?),
        other => {
            return Err(Error::InvalidInput(format!(
                "unknown embedding provider: {other}. Supported: local, openai, ollama, none"
            )))
        }
    };
    tracing::info!(provider = provider.name(), dimension = provider.dimension(), "embedding provider configured");
    Ok(Some(provider))
}

/// L2-normalize a vector in place. A zero vector is left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Model for a remote provider. The local default model name means "not
/// chosen", so the remote provider's own default applies.
fn remote_model(config: &EmbeddingConfig, default: &str) -> String {
    if config.model.is_empty() || config.model == EmbeddingConfig::default().model {
        default.to_string()
    } else {
        config.model.clone()
    }
}

/// Shared HTTP client for the remote providers.
fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?)
}

/// Turn a non-success HTTP response into a typed error, keeping the body for
/// the log line.
async fn check_status(response: reqwest::Response, backend: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::ProviderUnavailable(format!("{backend} returned HTTP {status}: {body}")))
}
