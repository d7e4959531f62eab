#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cairn::config::SearchConfig;
use cairn::embedding::{l2_normalize, EmbeddingProvider};
use cairn::error::{Error, Result};
use cairn::memory::types::{NewObservation, Observation, ObservationType};
use cairn::search::hybrid::HybridSearch;
use cairn::vector::sqlite::SqliteVectorStore;
use cairn::vector::{CollectionInfo, Metadata, VectorRecord, VectorSearchResult, VectorStore};
use rusqlite::Connection;

pub const PROJECT: &str = "cairn";

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    cairn::db::open_memory_database().unwrap()
}

pub fn shared_db() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(test_db()))
}

/// A new observation in [`PROJECT`] with a fixed creation time.
pub fn new_observation(title: &str, narrative: &str, epoch: i64) -> NewObservation {
    NewObservation {
        memory_session_id: "session-1".into(),
        project: PROJECT.into(),
        observation_type: Some(ObservationType::Discovery),
        title: Some(title.into()),
        narrative: Some(narrative.into()),
        created_at_epoch: Some(epoch),
        ..Default::default()
    }
}

/// Insert and read back an observation.
pub fn insert(conn: &Connection, new: &NewObservation) -> Observation {
    let id = cairn::memory::store::insert_observation(conn, new).unwrap();
    cairn::memory::store::get_observation(conn, id).unwrap().unwrap()
}

pub fn insert_shared(db: &Arc<Mutex<Connection>>, new: &NewObservation) -> Observation {
    insert(&db.lock().unwrap(), new)
}

/// Deterministic embedder. Dimension `i` is set when the lower-cased text
/// contains `keywords[i]` as a substring; text with no keyword gets a spike
/// in the last dimension. Vectors are L2-normalized.
pub struct SpikeEmbedder {
    keywords: Vec<String>,
    pub init_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
    /// Number of upcoming `initialize` calls that fail.
    pub fail_inits: AtomicUsize,
    pub fail_embeds: bool,
}

impl SpikeEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            init_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            fail_inits: AtomicUsize::new(0),
            fail_embeds: false,
        }
    }

    pub fn failing_inits(self, n: usize) -> Self {
        self.fail_inits.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_embeds(mut self) -> Self {
        self.fail_embeds = true;
        self
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let mut v = vec![0.0f32; self.keywords.len() + 1];
        for (i, keyword) in self.keywords.iter().enumerate() {
            if text.contains(keyword.as_str()) {
                v[i] = 1.0;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[self.keywords.len()] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingProvider for SpikeEmbedder {
    fn name(&self) -> &str {
        "spike"
    }

    fn dimension(&self) -> usize {
        self.keywords.len() + 1
    }

    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        // Hold the cell long enough for concurrent callers to pile up.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let remaining = self.fail_inits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_inits.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::ProviderUnavailable("model not loaded".into()));
        }
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeds {
            return Err(Error::Inference("spike embedder told to fail".into()));
        }
        Ok(self.vector_for(text))
    }

    async fn is_available(&self) -> bool {
        !self.fail_embeds
    }
}

/// Vector store whose `search` always fails. Everything else succeeds and
/// records nothing.
pub struct FailingSearchStore;

#[async_trait]
impl VectorStore for FailingSearchStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn initialize(&self, _collection: &str, _dimension: usize) -> Result<()> {
        Ok(())
    }

    async fn reset(&self, _collection: &str, _dimension: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _collection: &str, _records: &[VectorRecord]) -> Result<()> {
        Ok(())
    }

    async fn search(
        &self,
        _collection: &str,
        _query: &[f32],
        _limit: usize,
        _filter: Option<&Metadata>,
    ) -> Result<Vec<VectorSearchResult>> {
        Err(Error::ProviderUnavailable("vector backend is down".into()))
    }

    async fn delete(&self, _collection: &str, _ids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn collection_info(&self, _collection: &str) -> Result<Option<CollectionInfo>> {
        Ok(None)
    }

    async fn is_available(&self) -> bool {
        false
    }
}

/// Hybrid engine over `db` with a spike embedder and an in-memory SQLite
/// vector store, default weights.
pub fn hybrid_engine(
    db: Arc<Mutex<Connection>>,
    embedder: Arc<SpikeEmbedder>,
) -> (HybridSearch, Arc<SqliteVectorStore>) {
    let store = Arc::new(SqliteVectorStore::open_in_memory().unwrap());
    let search = HybridSearch::new(
        db,
        PROJECT,
        Some(embedder as Arc<dyn EmbeddingProvider>),
        Some(Arc::clone(&store) as Arc<dyn VectorStore>),
        &SearchConfig::default(),
    );
    (search, store)
}
