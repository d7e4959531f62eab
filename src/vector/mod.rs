//! Keyed vector storage with exact similarity search.
//!
//! [`VectorStore`] is the backend contract. Two implementations:
//! - [`sqlite::SqliteVectorStore`]: brute-force cosine scan over a local
//!   SQLite file, one table per collection.
//! - [`qdrant::QdrantVectorStore`]: delegates to a Qdrant server over HTTP.

pub mod qdrant;
pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CairnConfig;
use crate::error::{Error, Result};

/// A scalar metadata value. Serialized untagged, so stored metadata is a
/// plain JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Filters compare values by their string form, so `Integer(5)` matches
/// `String("5")`.
impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// True when every filter pair is present in `metadata` with an equal string
/// form. An empty filter matches everything.
pub fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter.iter().all(|(key, want)| {
        metadata
            .get(key)
            .is_some_and(|have| have.to_string() == want.to_string())
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

/// A search hit. `score` is cosine similarity: higher is better.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorSearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
    pub dimension: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend identifier (`sqlite`, `qdrant`).
    fn name(&self) -> &str;

    /// Create the collection if absent. The dimension is fixed by the first
    /// call; a later call with a different dimension is a
    /// [`Error::DimensionMismatch`].
    async fn initialize(&self, collection: &str, dimension: usize) -> Result<()>;

    /// Drop every record in the collection and re-declare it with
    /// `dimension`, creating it if absent. The only way to change a
    /// collection's dimension.
    async fn reset(&self, collection: &str, dimension: usize) -> Result<()>;

    /// Insert or fully replace records by id.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Top `limit` records by cosine similarity, optionally restricted to
    /// records whose metadata matches every pair in `filter`.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<VectorSearchResult>>;

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// `None` when the collection does not exist.
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>>;

    /// Cheap health probe.
    async fn is_available(&self) -> bool;
}

/// Create the configured vector store backend.
pub fn create_store(config: &CairnConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.vector_store.backend.as_str() {
        "sqlite" => Arc::new(sqlite::SqliteVectorStore::open(config.resolved_vector_db_path())?),
        "qdrant" => Arc::new(qdrant::QdrantVectorStore::new(&config.vector_store.url)?),
        other => anyhow::bail!("unknown vector store backend: {other}. Supported: sqlite, qdrant"),
    };
    tracing::info!(backend = store.name(), "vector store configured");
    Ok(store)
}

/// Cosine similarity in [-1, 1]. Returns 0 when the lengths differ or either
/// vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        (dot / denominator).clamp(-1.0, 1.0)
    }
}

/// Serialize a vector as little-endian f32 bytes.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn bytes_to_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Parse(format!(
            "vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Reject a vector whose length differs from the collection dimension.
pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3, -1.2, 4.0, 0.01];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_bounded() {
        let pairs: [(&[f32], &[f32]); 4] = [
            (&[1.0, 0.0], &[-1.0, 0.0]),
            (&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]),
            (&[1e-3, 5e3], &[7e2, -2e-2]),
            (&[0.5, 0.5, 0.5], &[0.5, 0.5, 0.5]),
        ];
        for (a, b) in pairs {
            let s = cosine_similarity(a, b);
            assert!((-1.0..=1.0).contains(&s), "{s} out of bounds");
        }
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_cases_are_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn vector_bytes_are_little_endian() {
        let bytes = vector_to_bytes(&[1.0, -2.5]);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(bytes_to_vector(&bytes).unwrap(), vec![1.0, -2.5]);
        assert!(matches!(bytes_to_vector(&[0, 1, 2]), Err(Error::Parse(_))));
    }

    #[test]
    fn filter_is_all_of_string_equality() {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), "bugfix".into());
        metadata.insert("observation_id".into(), 7i64.into());

        let mut filter = Metadata::new();
        assert!(matches_filter(&metadata, &filter));

        filter.insert("type".into(), "bugfix".into());
        filter.insert("observation_id".into(), "7".into());
        assert!(matches_filter(&metadata, &filter));

        filter.insert("project".into(), "cairn".into());
        assert!(!matches_filter(&metadata, &filter));
    }

    #[test]
    fn metadata_roundtrips_as_plain_json() {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), "Fix reconnect".into());
        metadata.insert("created_at_epoch".into(), 1_700_000_000_000i64.into());

        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"created_at_epoch":1700000000000,"title":"Fix reconnect"}"#);
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
