//! Local ONNX Runtime embedding provider.
//!
//! Implements [`EmbeddingProvider`] using the all-MiniLM-L6-v2 model via
//! `ort`. Handles asset download, WordPiece tokenization, inference, mean
//! pooling, and L2 normalization. The model is loaded lazily on first use.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{ArrayView2, Axis};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokio::sync::OnceCell;

use super::assets::{self, ModelAssets};
use super::tokenizer::WordPieceTokenizer;
use super::{l2_normalize, EmbeddingProvider};
use crate::config::{expand_tilde, EmbeddingConfig};
use crate::error::{Error, Result};

/// Number of dimensions in the embedding vectors (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Loaded graph plus vocabulary. Built once per provider.
struct LoadedModel {
    session: Mutex<Session>,
    tokenizer: WordPieceTokenizer,
}

// Safety: the tokenizer is plain data. Session is behind a Mutex, which
// guarantees exclusive access during run().
unsafe impl Send for LoadedModel {}
unsafe impl Sync for LoadedModel {}

fn ort_err(e: impl std::fmt::Display) -> Error {
    Error::Inference(e.to_string())
}

impl LoadedModel {
    fn load(assets: &ModelAssets) -> Result<Self> {
        let tokenizer = WordPieceTokenizer::from_file(&assets.vocab)?;

        let session = Session::builder()
            .map_err(ort_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_err)?
            .with_intra_threads(4)
            .map_err(ort_err)?
            .commit_from_file(&assets.model)
            .map_err(|e| Error::Parse(format!("failed to load ONNX model {}: {e}", assets.model.display())))?;

        tracing::info!(model = %assets.model.display(), vocab = tokenizer.vocab_size(), "ONNX model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // Step 1: Tokenize
        let ids = self.tokenizer.encode(text);
        let seq_len = ids.len();

        // Step 2: Three equal-length inputs: ids, all-ones mask, all-zero type ids
        let shape = vec![1i64, seq_len as i64];
        let input_ids: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input_ids.into_boxed_slice())).map_err(ort_err)?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), vec![1i64; seq_len].into_boxed_slice())).map_err(ort_err)?;
        let token_type_ids_tensor =
            Tensor::from_array((shape, vec![0i64; seq_len].into_boxed_slice())).map_err(ort_err)?;

        // Step 3: Run ONNX inference
        let mut session = self
            .session
            .lock()
            .map_err(|e| Error::Inference(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            })
            .map_err(ort_err)?;

        // Step 4: Extract hidden states, shape [1, seq_len, 384]
        let hidden = outputs
            .get("last_hidden_state")
            .ok_or_else(|| Error::Inference("model has no last_hidden_state output".into()))?;

        let (shape, data) = hidden.try_extract_tensor::<f32>().map_err(ort_err)?;
        let dims: &[i64] = &shape;
        if dims.len() != 3 || dims[0] != 1 || dims[1] as usize != seq_len {
            return Err(Error::Inference(format!(
                "unexpected last_hidden_state shape: {dims:?}, expected [1, {seq_len}, {EMBEDDING_DIM}]"
            )));
        }
        let hidden_dim = dims[2] as usize;
        if hidden_dim != EMBEDDING_DIM {
            return Err(Error::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: hidden_dim,
            });
        }

        // Steps 5 and 6: mean pool, then L2 normalize
        mean_pool(data, seq_len, hidden_dim)
    }
}

/// Average the hidden states over every position, `[CLS]` and `[SEP]`
/// included, then L2-normalize.
fn mean_pool(hidden: &[f32], seq_len: usize, hidden_dim: usize) -> Result<Vec<f32>> {
    let view = ArrayView2::from_shape((seq_len, hidden_dim), hidden)
        .map_err(|e| Error::Inference(format!("hidden state has wrong length: {e}")))?;
    let mut pooled = view
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::Inference("empty token sequence".into()))?
        .to_vec();
    l2_normalize(&mut pooled);
    Ok(pooled)
}

/// Local ONNX-based embedding provider using all-MiniLM-L6-v2.
pub struct LocalEmbeddingProvider {
    name: String,
    cache_dir: PathBuf,
    model: OnceCell<Arc<LoadedModel>>,
}

impl LocalEmbeddingProvider {
    /// Construction is free: nothing is read or downloaded until the first
    /// embed, `initialize`, or availability probe.
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            name: format!("local/{}", config.model),
            cache_dir: expand_tilde(&config.cache_dir),
            model: OnceCell::new(),
        }
    }

    /// Concurrent first callers share one in-flight load. A failed load
    /// leaves the cell empty, so the next call retries.
    async fn model(&self) -> Result<Arc<LoadedModel>> {
        self.model
            .get_or_try_init(|| async {
                let assets = assets::ensure_assets(&self.cache_dir).await?;
                let loaded = tokio::task::spawn_blocking(move || LoadedModel::load(&assets)).await??;
                Ok::<_, Error>(Arc::new(loaded))
            })
            .await
            .map(Arc::clone)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn initialize(&self) -> Result<()> {
        self.model().await.map(|_| ())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.model().await?;
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || model.embed(&text)).await?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let model = self.model().await?;
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || texts.iter().map(|t| model.embed(t)).collect()).await?
    }

    async fn is_available(&self) -> bool {
        match self.model().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "local embedding model unavailable");
                false
            }
        }
    }
}
