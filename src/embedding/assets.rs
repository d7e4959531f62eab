//! Model asset acquisition for the local provider.
//!
//! Fetches the all-MiniLM-L6-v2 ONNX graph and its WordPiece vocabulary from
//! HuggingFace into the cache directory when they are not already there.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

const HF_BASE_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

/// (remote path under [`HF_BASE_URL`], local file name)
const ASSETS: [(&str, &str); 2] = [("onnx/model.onnx", "model.onnx"), ("vocab.txt", "vocab.txt")];

/// Resolved on-disk locations of the local model files.
#[derive(Debug, Clone)]
pub struct ModelAssets {
    pub model: PathBuf,
    pub vocab: PathBuf,
}

impl ModelAssets {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model: dir.join("model.onnx"),
            vocab: dir.join("vocab.txt"),
        }
    }

    pub fn exist(&self) -> bool {
        self.model.exists() && self.vocab.exists()
    }
}

/// Make sure both model files exist in `dir`, downloading any that are
/// missing. Files already present are left untouched.
pub async fn ensure_assets(dir: &Path) -> Result<ModelAssets> {
    tokio::fs::create_dir_all(dir).await?;

    for (remote, local) in ASSETS {
        let dest = dir.join(local);
        if dest.exists() {
            continue;
        }
        let url = format!("{HF_BASE_URL}/{remote}");
        tracing::info!(file = local, %url, "downloading model asset");
        let bytes = download_file(&url, &dest).await?;
        tracing::info!(file = local, kb = bytes / 1024, "model asset downloaded");
    }

    Ok(ModelAssets::in_dir(dir))
}

/// Download a file with a progress bar. Writes to `<dest>.tmp` and renames,
/// so an interrupted download never leaves a truncated asset behind.
async fn download_file(url: &str, dest: &Path) -> Result<u64> {
    let mut response = reqwest::get(url)
        .await
        .map_err(|e| Error::ProviderUnavailable(format!("request to {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::ProviderUnavailable(format!(
            "download of {url} failed with HTTP {}",
            response.status()
        )));
    }

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            if let Ok(style) =
                ProgressStyle::default_bar().template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
            {
                pb.set_style(style.progress_chars("##-"));
            }
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    let mut written = 0u64;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest).await?;
    pb.finish_and_clear();
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assets_resolve_inside_dir() {
        let assets = ModelAssets::in_dir(Path::new("/tmp/models"));
        assert_eq!(assets.model, PathBuf::from("/tmp/models/model.onnx"));
        assert_eq!(assets.vocab, PathBuf::from("/tmp/models/vocab.txt"));
    }

    #[tokio::test]
    async fn present_assets_are_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"graph").unwrap();
        std::fs::write(dir.path().join("vocab.txt"), b"[CLS]\n[SEP]\n").unwrap();

        let assets = ensure_assets(dir.path()).await.unwrap();
        assert!(assets.exist());
        assert_eq!(std::fs::read(&assets.model).unwrap(), b"graph");
    }
}
