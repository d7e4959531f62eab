pub mod reindex;
pub mod search;
pub mod status;
pub mod timeline;

use anyhow::{Context, Result};
use cairn::embedding::assets::{ensure_assets, ModelAssets};

/// Download the ONNX embedding model and vocabulary to the cache directory.
pub async fn model_download(config: &cairn::config::EmbeddingConfig) -> Result<()> {
    let cache_dir = cairn::config::expand_tilde(&config.cache_dir);
    let existing = ModelAssets::in_dir(&cache_dir);

    if existing.exist() {
        println!("Model already present in {}", cache_dir.display());
        return Ok(());
    }

    println!("Downloading all-MiniLM-L6-v2 (~90MB) to {}...", cache_dir.display());
    let assets = ensure_assets(&cache_dir)
        .await
        .context("model download failed")?;

    println!("Model saved to {}", assets.model.display());
    println!("Vocabulary saved to {}", assets.vocab.display());
    println!("Model download complete. Ready for use.");
    Ok(())
}
