use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CairnConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub vector_db_path: String,
    /// Project whose observations this process searches and indexes.
    pub project: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local`, `openai`, `ollama`, or `none` for keyword-only operation.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// `sqlite` (brute-force, local file) or `qdrant`.
    pub backend: String,
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub vector_weight: f32,
    pub text_weight: f32,
    pub candidate_multiplier: usize,
    pub default_limit: usize,
    pub timeline_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 37777,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_cairn_dir();
        Self {
            db_path: dir.join("cairn.db").to_string_lossy().into_owned(),
            vector_db_path: dir.join("vectors.db").to_string_lossy().into_owned(),
            project: "default".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_cairn_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            base_url: None,
            api_key: None,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".into(),
            url: crate::vector::qdrant::DEFAULT_URL.into(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            text_weight: 0.3,
            candidate_multiplier: 4,
            default_limit: 10,
            timeline_depth: 3,
        }
    }
}

/// Returns `~/.cairn/`
pub fn default_cairn_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".cairn")
}

/// Returns the default config file path: `~/.cairn/config.toml`
pub fn default_config_path() -> PathBuf {
    default_cairn_dir().join("config.toml")
}

impl CairnConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            CairnConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut String); 7] = [
            ("CAIRN_DB", &mut self.storage.db_path),
            ("CAIRN_VECTOR_DB", &mut self.storage.vector_db_path),
            ("CAIRN_PROJECT", &mut self.storage.project),
            ("CAIRN_LOG_LEVEL", &mut self.server.log_level),
            ("CAIRN_EMBEDDING_PROVIDER", &mut self.embedding.provider),
            ("CAIRN_EMBEDDING_MODEL", &mut self.embedding.model),
            ("CAIRN_VECTOR_STORE", &mut self.vector_store.backend),
        ];
        for (key, slot) in overrides {
            if let Ok(val) = std::env::var(key) {
                *slot = val;
            }
        }
        if let Ok(val) = std::env::var("QDRANT_URL") {
            self.vector_store.url = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.embedding.api_key.get_or_insert(val);
        }
        if let Ok(val) = std::env::var("OLLAMA_HOST") {
            if self.embedding.provider == "ollama" {
                self.embedding.base_url.get_or_insert(val);
            }
        }
    }

    /// Resolve the observation database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn resolved_vector_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.vector_db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
