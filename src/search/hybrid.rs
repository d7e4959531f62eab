//! Hybrid retrieval: FTS5 keyword ranking fused with embedding similarity.
//!
//! [`HybridSearch`] always runs the keyword leg. When an embedding provider
//! and a vector store are both configured it also embeds the query and asks
//! the store for nearest neighbours. Candidates are merged by observation id
//! and scored as `vector_weight * vector_score + text_weight * fts_score`.
//! Vector-path failures never fail a search; they are logged and the call
//! reports `keyword-only` mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::keyword::{KeywordSearch, SearchFilters, TimelineResult};
use crate::config::SearchConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::memory::types::Observation;
use crate::vector::{Metadata, MetadataValue, VectorRecord, VectorStore};

/// Records per vector-store upsert during batch indexing.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Characters of indexed text kept in the `content_preview` metadata field.
const PREVIEW_CHARS: usize = 200;

const COLLECTION_PREFIX: &str = "cm_";

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    Hybrid,
    KeywordOnly,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::KeywordOnly => "keyword-only",
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridSearchResult {
    pub record_id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub created_at_epoch: i64,
    pub snippet: String,
    /// Normalized keyword score in (0, 1]; 0 when only the vector leg found it.
    pub fts_score: f32,
    /// Cosine similarity; 0 when only the keyword leg found it.
    pub vector_score: f32,
    pub hybrid_score: f32,
}

/// Ranked results plus the mode actually used for this call.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub mode: SearchMode,
    pub results: Vec<HybridSearchResult>,
}

/// Narrowing applied to both legs. The type goes to the vector store as a
/// metadata filter; the date range is checked against `created_at_epoch`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub observation_type: Option<String>,
    pub date_start: Option<i64>,
    pub date_end: Option<i64>,
}

impl SearchOptions {
    fn in_range(&self, epoch: i64) -> bool {
        self.date_start.is_none_or(|start| epoch >= start)
            && self.date_end.is_none_or(|end| epoch <= end)
    }
}

#[derive(Debug, Clone)]
pub enum TimelineAnchor {
    Id(i64),
    /// Anchor on the best keyword match for this query.
    Query(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchStatus {
    pub mode: SearchMode,
    pub fts_available: bool,
    /// Both an embedding provider and a vector store are configured.
    pub vector_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    pub embedding_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_store: Option<String>,
    pub vector_store_available: bool,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct HybridSearch {
    keyword: KeywordSearch,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn VectorStore>>,
    project: String,
    collection: String,
    vector_weight: f32,
    text_weight: f32,
    candidate_multiplier: usize,
    ready: OnceCell<()>,
}

impl HybridSearch {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        project: &str,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        store: Option<Arc<dyn VectorStore>>,
        config: &SearchConfig,
    ) -> Self {
        let (vector_weight, text_weight) = normalize_weights(config.vector_weight, config.text_weight);
        Self {
            keyword: KeywordSearch::new(db),
            embedder,
            store,
            project: project.to_string(),
            collection: sanitize_collection_name(project),
            vector_weight,
            text_weight,
            candidate_multiplier: config.candidate_multiplier.max(1),
            ready: OnceCell::new(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Effective `(vector_weight, text_weight)`, summing to 1.
    pub fn weights(&self) -> (f32, f32) {
        (self.vector_weight, self.text_weight)
    }

    /// `vector_weight * vector_score + text_weight * fts_score`.
    pub fn score(&self, vector_score: f32, fts_score: f32) -> f32 {
        self.vector_weight * vector_score + self.text_weight * fts_score
    }

    pub fn keyword(&self) -> &KeywordSearch {
        &self.keyword
    }

    fn vector_handles(&self) -> Option<(&Arc<dyn EmbeddingProvider>, &Arc<dyn VectorStore>)> {
        self.embedder.as_ref().zip(self.store.as_ref())
    }

    /// Current mode: hybrid once the vector path is configured and ready.
    pub fn mode(&self) -> SearchMode {
        if self.vector_handles().is_some() && self.ready.initialized() {
            SearchMode::Hybrid
        } else {
            SearchMode::KeywordOnly
        }
    }

    /// Load the embedding backend and create the project's collection.
    /// Concurrent callers share one attempt; a failure is returned and the
    /// next call tries again. A no-op without a vector path.
    pub async fn initialize(&self) -> Result<()> {
        let Some((embedder, store)) = self.vector_handles() else {
            return Ok(());
        };
        self.ready
            .get_or_try_init(|| async {
                embedder.initialize().await?;
                store.initialize(&self.collection, embedder.dimension()).await?;
                tracing::info!(
                    collection = %self.collection,
                    provider = embedder.name(),
                    store = store.name(),
                    dimension = embedder.dimension(),
                    "vector search ready"
                );
                Ok::<_, Error>(())
            })
            .await?;
        Ok(())
    }

    /// Initialize for a full re-index. When the collection was declared with
    /// a dimension other than the provider's, it is emptied and re-declared
    /// first. Returns whether the collection was reset.
    pub async fn rebuild(&self) -> Result<bool> {
        let Some((embedder, store)) = self.vector_handles() else {
            return Ok(false);
        };
        embedder.initialize().await?;

        let dimension = embedder.dimension();
        let reset = match store.collection_info(&self.collection).await? {
            Some(info) if info.dimension != 0 && info.dimension != dimension => {
                tracing::warn!(
                    collection = %self.collection,
                    stored = info.dimension,
                    dimension,
                    dropped = info.count,
                    "embedding dimension changed, resetting collection"
                );
                store.reset(&self.collection, dimension).await?;
                true
            }
            _ => false,
        };

        self.initialize().await?;
        Ok(reset)
    }

    /// Ranked search over the project's observations.
    pub async fn search(&self, query: &str, limit: usize, options: &SearchOptions) -> Result<SearchOutcome> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(SearchOutcome {
                mode: self.mode(),
                results: vec![],
            });
        }

        let candidate_limit = limit.saturating_mul(self.candidate_multiplier);
        let type_filter = options.observation_type.as_deref().map(str::to_lowercase);

        // 1. Keyword leg, always
        let filters = SearchFilters {
            observation_type: type_filter.clone(),
            project: Some(self.project.clone()),
            date_start: options.date_start,
            date_end: options.date_end,
        };
        let keyword_hits = match self.keyword.search(query, candidate_limit, filters).await {
            Ok(hits) => hits,
            Err(Error::Query(reason)) => {
                tracing::warn!(query, %reason, "keyword index rejected query, no keyword candidates");
                vec![]
            }
            Err(e) => return Err(e),
        };

        let mut candidates: HashMap<i64, HybridSearchResult> = HashMap::new();
        for hit in keyword_hits {
            candidates.insert(
                hit.id,
                HybridSearchResult {
                    record_id: hit.id,
                    fts_score: hit.normalized_score(),
                    title: hit.title,
                    record_type: hit.record_type,
                    created_at_epoch: hit.created_at_epoch,
                    snippet: hit.snippet,
                    vector_score: 0.0,
                    hybrid_score: 0.0,
                },
            );
        }

        // 2. Vector leg, when configured; failures degrade to keyword-only
        let mut mode = SearchMode::KeywordOnly;
        if self.vector_handles().is_some() {
            match self.vector_candidates(query, candidate_limit, type_filter.as_deref()).await {
                Ok(hits) => {
                    mode = SearchMode::Hybrid;
                    for (id, score, metadata) in hits {
                        merge_vector_hit(&mut candidates, id, score, &metadata, options);
                    }
                }
                Err(e) if e.is_unavailable() => {
                    tracing::warn!(error = %e, query, "vector backend unavailable, using keyword results only");
                }
                Err(e) => {
                    tracing::error!(error = %e, query, "vector search failed, using keyword results only");
                }
            }
        }

        // 3. Score and rank
        let mut results: Vec<HybridSearchResult> = candidates
            .into_values()
            .map(|mut r| {
                r.hybrid_score = self.score(r.vector_score, r.fts_score);
                r
            })
            .collect();
        rank(&mut results);
        results.truncate(limit);

        tracing::debug!(query, %mode, results = results.len(), "hybrid search");
        Ok(SearchOutcome { mode, results })
    }

    async fn vector_candidates(
        &self,
        query: &str,
        limit: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<(i64, f32, Metadata)>> {
        let (embedder, store) = self
            .vector_handles()
            .ok_or_else(|| Error::ProviderUnavailable("vector search not configured".into()))?;
        self.initialize().await?;

        let query_vector = embedder.embed(query).await?;
        let filter = type_filter.map(|t| {
            let mut f = Metadata::new();
            f.insert("type".into(), t.into());
            f
        });
        let hits = store
            .search(&self.collection, &query_vector, limit, filter.as_ref())
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let id = hit.metadata.get("observation_id").and_then(MetadataValue::as_i64)?;
                (id != 0).then_some((id, hit.score, hit.metadata))
            })
            .collect())
    }

    /// Embed and upsert one observation. Failures are logged and reported
    /// as `false`; the observation stays searchable by keyword.
    pub async fn index(&self, observation: &Observation) -> bool {
        if self.vector_handles().is_none() {
            return false;
        }
        match self.try_index(observation).await {
            Ok(()) => true,
            Err(e) if e.is_unavailable() => {
                tracing::warn!(id = observation.id, error = %e, "vector backend unavailable, observation not indexed");
                false
            }
            Err(e) => {
                tracing::error!(id = observation.id, error = %e, "vector indexing failed");
                false
            }
        }
    }

    async fn try_index(&self, observation: &Observation) -> Result<()> {
        let (embedder, store) = self
            .vector_handles()
            .ok_or_else(|| Error::ProviderUnavailable("vector search not configured".into()))?;
        self.initialize().await?;

        let text = observation_to_text(observation);
        let vector = embedder.embed(&text).await?;
        let record = self.to_record(observation, &text, vector);
        store.upsert(&self.collection, &[record]).await?;
        tracing::debug!(id = observation.id, collection = %self.collection, "observation indexed");
        Ok(())
    }

    /// Embed all observations in one batch call and upsert them in chunks of
    /// [`UPSERT_BATCH_SIZE`]. Chunks are independent: a failed chunk is
    /// logged and skipped. Returns the number of records stored.
    pub async fn index_batch(&self, observations: &[Observation]) -> usize {
        let Some((embedder, store)) = self.vector_handles() else {
            return 0;
        };
        if observations.is_empty() {
            return 0;
        }
        if let Err(e) = self.initialize().await {
            tracing::warn!(error = %e, "vector indexing skipped: initialization failed");
            return 0;
        }

        let texts: Vec<String> = observations.iter().map(observation_to_text).collect();
        let vectors = match embedder.embed_batch(&texts).await {
            Ok(v) if v.len() == texts.len() => v,
            Ok(v) => {
                tracing::warn!(expected = texts.len(), got = v.len(), "embedding batch size mismatch");
                return 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, count = texts.len(), "batch embedding failed");
                return 0;
            }
        };

        let records: Vec<VectorRecord> = observations
            .iter()
            .zip(texts.iter())
            .zip(vectors)
            .map(|((obs, text), vector)| self.to_record(obs, text, vector))
            .collect();

        let mut stored = 0;
        for (i, chunk) in records.chunks(UPSERT_BATCH_SIZE).enumerate() {
            match store.upsert(&self.collection, chunk).await {
                Ok(()) => stored += chunk.len(),
                Err(e) => tracing::warn!(chunk = i, size = chunk.len(), error = %e, "vector upsert chunk failed"),
            }
        }

        tracing::info!(stored, total = records.len(), collection = %self.collection, "observations indexed");
        stored
    }

    fn to_record(&self, observation: &Observation, text: &str, vector: Vec<f32>) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("observation_id".into(), observation.id.into());
        metadata.insert("session_id".into(), observation.memory_session_id.clone().into());
        metadata.insert("type".into(), observation.observation_type.as_str().into());
        metadata.insert("title".into(), observation.title.clone().unwrap_or_default().into());
        metadata.insert("project".into(), self.project.clone().into());
        metadata.insert("created_at_epoch".into(), observation.created_at_epoch.into());
        metadata.insert("content_preview".into(), text.chars().take(PREVIEW_CHARS).collect::<String>().into());

        VectorRecord {
            id: record_id(observation.id),
            vector,
            metadata,
        }
    }

    /// Observations around an anchor within this project.
    pub async fn timeline(
        &self,
        anchor: TimelineAnchor,
        depth_before: usize,
        depth_after: usize,
    ) -> Result<TimelineResult> {
        let anchor_id = match anchor {
            TimelineAnchor::Id(id) => id,
            TimelineAnchor::Query(query) => {
                match self
                    .keyword
                    .find_anchor_by_query(&query, Some(self.project.clone()))
                    .await?
                {
                    Some(id) => id,
                    None => return Ok(TimelineResult::default()),
                }
            }
        };
        self.keyword
            .timeline(anchor_id, depth_before, depth_after, Some(self.project.clone()))
            .await
    }

    pub async fn status(&self) -> SearchStatus {
        let mut status = SearchStatus {
            mode: self.mode(),
            fts_available: self.keyword.is_available().await,
            vector_available: self.vector_handles().is_some(),
            embedding_provider: None,
            embedding_available: false,
            vector_store: None,
            vector_store_available: false,
            collection: self.collection.clone(),
            document_count: None,
            dimension: None,
        };

        if let Some((embedder, store)) = self.vector_handles() {
            status.embedding_provider = Some(embedder.name().to_string());
            status.vector_store = Some(store.name().to_string());
            status.embedding_available = embedder.is_available().await;
            status.vector_store_available = store.is_available().await;
            if status.vector_store_available {
                match store.collection_info(&self.collection).await {
                    Ok(info) => status.document_count = Some(info.map_or(0, |i| i.count)),
                    Err(e) => tracing::debug!(error = %e, "collection info unavailable"),
                }
                status.dimension = Some(embedder.dimension());
            }
        }
        status
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Scale weights to sum to 1. Negative weights count as 0; if nothing
/// positive remains the defaults (0.7, 0.3) apply.
pub fn normalize_weights(vector_weight: f32, text_weight: f32) -> (f32, f32) {
    let vw = if vector_weight.is_finite() { vector_weight.max(0.0) } else { 0.0 };
    let tw = if text_weight.is_finite() { text_weight.max(0.0) } else { 0.0 };
    let total = vw + tw;
    if total > 0.0 {
        (vw / total, tw / total)
    } else {
        tracing::warn!(vector_weight, text_weight, "search weights must be positive, using defaults");
        (0.7, 0.3)
    }
}

fn merge_vector_hit(
    candidates: &mut HashMap<i64, HybridSearchResult>,
    id: i64,
    score: f32,
    metadata: &Metadata,
    options: &SearchOptions,
) {
    if let Some(existing) = candidates.get_mut(&id) {
        existing.vector_score = score;
        return;
    }

    let text = |key: &str| {
        metadata
            .get(key)
            .map(|v| v.to_string())
            .unwrap_or_default()
    };
    let created_at_epoch = metadata
        .get("created_at_epoch")
        .and_then(MetadataValue::as_i64)
        .unwrap_or(0);
    if !options.in_range(created_at_epoch) {
        return;
    }

    candidates.insert(
        id,
        HybridSearchResult {
            record_id: id,
            title: text("title"),
            record_type: text("type"),
            created_at_epoch,
            snippet: text("content_preview"),
            fts_score: 0.0,
            vector_score: score,
            hybrid_score: 0.0,
        },
    );
}

/// Descending by hybrid score; ties go to the newer record, then the higher id.
fn rank(results: &mut [HybridSearchResult]) {
    results.sort_by(|a, b| {
        b.hybrid_score
            .total_cmp(&a.hybrid_score)
            .then(b.created_at_epoch.cmp(&a.created_at_epoch))
            .then(b.record_id.cmp(&a.record_id))
    });
}

/// Vector record id for an observation.
pub fn record_id(observation_id: i64) -> String {
    format!("obs_{observation_id}")
}

/// Composite text embedded for an observation: prefixed title and subtitle,
/// the narrative, then facts and concepts. Empty parts are left out.
pub fn observation_to_text(obs: &Observation) -> String {
    let mut parts = Vec::new();
    if let Some(title) = obs.title.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("Title: {title}"));
    }
    if let Some(subtitle) = obs.subtitle.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("Subtitle: {subtitle}"));
    }
    if let Some(narrative) = obs.narrative.as_deref().filter(|s| !s.is_empty()) {
        parts.push(narrative.to_string());
    }
    if !obs.facts.is_empty() {
        parts.push(format!("Facts: {}", obs.facts.join("; ")));
    }
    if !obs.concepts.is_empty() {
        parts.push(format!("Concepts: {}", obs.concepts.join(", ")));
    }
    parts.join("\n\n")
}

/// Collection name for a project: `/`, `\` and `-` become `_`, anything
/// that is not a letter, digit or `_` is dropped, padded with `_` to 3
/// characters, cut to 60 characters, lower-cased, and prefixed with `cm_`.
/// Non-ASCII letters are kept.
pub fn sanitize_collection_name(project: &str) -> String {
    let mut name: Vec<char> = project
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '-') { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .take(60)
        .collect();
    while name.len() < 3 {
        name.push('_');
    }
    let name: String = name.into_iter().collect();
    format!("{COLLECTION_PREFIX}{}", name.to_lowercase())
}
