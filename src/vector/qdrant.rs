//! Qdrant backend over its REST API.
//!
//! Qdrant point ids must be unsigned integers or UUIDs, so record ids are
//! mapped to deterministic UUIDv5 point ids and the caller's id travels in
//! the payload under [`RECORD_ID_KEY`].

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    check_dimension, CollectionInfo, Metadata, VectorRecord, VectorSearchResult, VectorStore,
};
use crate::error::{Error, Result};

pub const DEFAULT_URL: &str = "http://localhost:6333";

/// Payload key carrying the caller's record id.
pub const RECORD_ID_KEY: &str = "record_id";

/// Deterministic Qdrant point id for a record id.
pub fn point_id(record_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: String,
    /// Dimension per collection, learned on initialize or first lookup.
    dimensions: RwLock<HashMap<String, usize>>,
}

impl QdrantVectorStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            dimensions: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn cached_dimension(&self, collection: &str) -> Option<usize> {
        self.dimensions
            .read()
            .ok()
            .and_then(|d| d.get(collection).copied())
    }

    fn remember_dimension(&self, collection: &str, dimension: usize) {
        if let Ok(mut d) = self.dimensions.write() {
            d.insert(collection.to_string(), dimension);
        }
    }

    /// Dimension of an existing collection, from cache or the server.
    async fn dimension(&self, collection: &str) -> Result<usize> {
        if let Some(d) = self.cached_dimension(collection) {
            return Ok(d);
        }
        match self.collection_info(collection).await? {
            Some(info) => Ok(info.dimension),
            None => Err(Error::InvalidInput(format!(
                "collection {collection} is not initialized"
            ))),
        }
    }

    async fn create_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("/collections/{collection}")))
            .json(&json!({ "vectors": { "size": dimension, "distance": "Cosine" } }))
            .send()
            .await?;
        Self::expect_success(response, "create collection").await?;

        tracing::info!(collection, dimension, "qdrant collection created");
        self.remember_dimension(collection, dimension);
        Ok(())
    }

    async fn expect_success(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::ProviderUnavailable(format!(
            "qdrant {action} failed with HTTP {status}: {body}"
        )))
    }
}

fn filter_json(filter: &Metadata) -> Value {
    let must: Vec<Value> = filter
        .iter()
        .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
        .collect();
    json!({ "must": must })
}

/// Collection dimension from a `GET /collections/{name}` body. Handles both
/// the single unnamed vector layout and a bare `params.size`.
fn parse_collection_info(name: &str, body: &Value) -> Result<CollectionInfo> {
    let result = body
        .get("result")
        .ok_or_else(|| Error::Parse("collection response has no result".into()))?;
    let params = &result["config"]["params"];
    let dimension = params["vectors"]["size"]
        .as_u64()
        .or_else(|| params["size"].as_u64())
        .unwrap_or(0) as usize;
    let count = result["points_count"].as_u64().unwrap_or(0) as usize;
    Ok(CollectionInfo {
        name: name.to_string(),
        count,
        dimension,
    })
}

fn to_search_result(point: ScoredPoint) -> Option<VectorSearchResult> {
    let mut payload = point.payload.unwrap_or_default();
    let id = match payload.remove(RECORD_ID_KEY) {
        Some(Value::String(s)) => s,
        _ => match &point.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    };

    let metadata: Metadata = match serde_json::from_value(Value::Object(payload)) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%id, error = %e, "skipping qdrant point with non-scalar payload");
            return None;
        }
    };

    Some(VectorSearchResult {
        id,
        score: point.score,
        metadata,
    })
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn initialize(&self, collection: &str, dimension: usize) -> Result<()> {
        if let Some(info) = self.collection_info(collection).await? {
            if info.dimension != 0 && info.dimension != dimension {
                return Err(Error::DimensionMismatch {
                    expected: info.dimension,
                    actual: dimension,
                });
            }
            self.remember_dimension(collection, dimension);
            return Ok(());
        }

        self.create_collection(collection, dimension).await
    }

    async fn reset(&self, collection: &str, dimension: usize) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{collection}")))
            .send()
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            Self::expect_success(response, "delete collection").await?;
        }
        if let Ok(mut d) = self.dimensions.write() {
            d.remove(collection);
        }
        self.create_collection(collection, dimension).await
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let dimension = self.dimension(collection).await?;
        for record in records {
            check_dimension(dimension, &record.vector)?;
        }

        let points: Vec<Value> = records
            .iter()
            .map(|r| {
                let mut payload = serde_json::to_value(&r.metadata)?;
                if let Value::Object(map) = &mut payload {
                    map.insert(RECORD_ID_KEY.into(), Value::String(r.id.clone()));
                }
                Ok(json!({
                    "id": point_id(&r.id).to_string(),
                    "vector": r.vector,
                    "payload": payload,
                }))
            })
            .collect::<Result<_>>()?;

        let response = self
            .client
            .put(self.url(&format!("/collections/{collection}/points?wait=true")))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        Self::expect_success(response, "upsert").await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<VectorSearchResult>> {
        if let Some(dimension) = self.cached_dimension(collection) {
            check_dimension(dimension, query)?;
        }

        let mut request = json!({
            "vector": query,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            request["filter"] = filter_json(f);
        }

        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/points/search")))
            .json(&request)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        let body = Self::expect_success(response, "search").await?.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("malformed qdrant search response: {e}")))?;

        Ok(parsed.result.into_iter().filter_map(to_search_result).collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let points: Vec<String> = ids.iter().map(|id| point_id(id).to_string()).collect();
        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/points/delete?wait=true")))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response, "delete").await?;
        Ok(())
    }

    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{collection}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::expect_success(response, "collection info").await?.text().await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("malformed qdrant collection response: {e}")))?;

        let info = parse_collection_info(collection, &value)?;
        if info.dimension > 0 {
            self.remember_dimension(collection, info.dimension);
        }
        Ok(Some(info))
    }

    async fn is_available(&self) -> bool {
        match self.client.get(self.url("/")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "qdrant health probe failed");
                false
            }
        }
    }
}
