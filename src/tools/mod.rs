pub mod search;
pub mod search_status;
pub mod store_observation;
pub mod store_summary;
pub mod timeline;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search::SearchParams;
use search_status::SearchStatusParams;
use std::sync::Arc;
use store_observation::StoreObservationParams;
use store_summary::StoreSummaryParams;
use timeline::TimelineParams;

use cairn::memory::types::{NewObservation, ObservationType, SessionSummary};
use cairn::search::engines::SearchEngines;
use cairn::search::hybrid::{SearchOptions, TimelineAnchor};

const MAX_LIMIT: usize = 100;

/// The Cairn MCP tool handler. Holds the per-project search engines (which
/// own the shared database handle) and exposes the tools via `#[tool_router]`.
#[derive(Clone)]
pub struct CairnTools {
    tool_router: ToolRouter<Self>,
    engines: Arc<SearchEngines>,
}

#[tool_router]
impl CairnTools {
    pub fn new(engines: Arc<SearchEngines>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engines,
        }
    }

    /// Persist an observation, then queue it for vector indexing.
    #[tool(description = "Store an observation from a coding session. Types: decision, bugfix, feature, refactor, discovery. It is keyword-searchable immediately and semantically searchable once indexed.")]
    async fn store_observation(
        &self,
        Parameters(params): Parameters<StoreObservationParams>,
    ) -> Result<String, String> {
        // 1. Validate inputs
        let observation_type = params
            .r#type
            .as_deref()
            .map(str::parse::<ObservationType>)
            .transpose()?;

        let has_content = [&params.title, &params.narrative, &params.text]
            .iter()
            .any(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()));
        if !has_content {
            return Err("one of title, narrative or text must be non-empty".into());
        }

        let engine = self.engines.get(params.project.as_deref()).map_err(|e| e.to_string())?;
        let new = NewObservation {
            memory_session_id: params.session_id,
            project: engine.search.project().to_string(),
            observation_type,
            title: params.title,
            subtitle: params.subtitle,
            narrative: params.narrative,
            text: params.text.unwrap_or_default(),
            facts: params.facts.unwrap_or_default(),
            concepts: params.concepts.unwrap_or_default(),
            files_read: params.files_read.unwrap_or_default(),
            files_modified: params.files_modified.unwrap_or_default(),
            prompt_number: params.prompt_number,
            created_at_epoch: None,
        };

        tracing::info!(project = %new.project, session = %new.memory_session_id, "store_observation called");

        // 2. Write (sync DB ops → spawn_blocking)
        let db = Arc::clone(self.engines.db());
        let observation = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| format!("db lock poisoned: {e}"))?;
            let id = cairn::memory::store::insert_observation(&conn, &new)
                .map_err(|e| format!("store failed: {e}"))?;
            cairn::memory::store::get_observation(&conn, id)
                .map_err(|e| format!("read back failed: {e}"))?
                .ok_or_else(|| format!("observation {id} vanished after insert"))
        })
        .await
        .map_err(|e| format!("db task failed: {e}"))??;

        // 3. Vector indexing happens in the background
        let id = observation.id;
        let observation_type = observation.observation_type;
        let queued = engine.queue.enqueue(observation);

        tracing::info!(id, queued, "observation stored");

        Ok(serde_json::json!({
            "id": id,
            "project": engine.search.project(),
            "type": observation_type,
            "indexing": if queued { "queued" } else { "skipped" },
        })
        .to_string())
    }

    /// Persist or replace a session summary.
    #[tool(description = "Store the summary of a coding session (request, investigated, learned, completed, next steps, notes). Replaces any earlier summary for the same session.")]
    async fn store_summary(
        &self,
        Parameters(params): Parameters<StoreSummaryParams>,
    ) -> Result<String, String> {
        let project = params
            .project
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.engines.default_project().to_string());
        let summary = SessionSummary {
            memory_session_id: params.session_id,
            project,
            request: params.request,
            investigated: params.investigated,
            learned: params.learned,
            completed: params.completed,
            next_steps: params.next_steps,
            notes: params.notes,
            ..Default::default()
        };

        let db = Arc::clone(self.engines.db());
        let session = summary.memory_session_id.clone();
        let id = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| format!("db lock poisoned: {e}"))?;
            cairn::memory::store::insert_summary(&conn, &summary).map_err(|e| format!("store failed: {e}"))
        })
        .await
        .map_err(|e| format!("db task failed: {e}"))??;

        tracing::info!(id, session = %session, "summary stored");
        Ok(serde_json::json!({ "id": id, "session_id": session }).to_string())
    }

    /// Ranked hybrid search.
    #[tool(description = "Search observations by query. Returns ranked results fusing keyword (BM25) and semantic similarity, plus a 'mode' field: 'hybrid' or 'keyword-only' when semantic search is unavailable.")]
    async fn search(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<String, String> {
        if params.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        let limit = params
            .limit
            .unwrap_or(self.engines.config().default_limit)
            .clamp(1, MAX_LIMIT);

        let engine = self.engines.get(params.project.as_deref()).map_err(|e| e.to_string())?;
        let options = SearchOptions {
            observation_type: params.r#type,
            date_start: params.date_start,
            date_end: params.date_end,
        };

        tracing::info!(query = %params.query, limit, project = engine.search.project(), "search called");

        let outcome = engine
            .search
            .search(&params.query, limit, &options)
            .await
            .map_err(|e| format!("search failed: {e}"))?;

        let mut response = serde_json::json!({
            "mode": outcome.mode,
            "total": outcome.results.len(),
            "results": outcome.results,
        });

        if params.include_summaries.unwrap_or(false) {
            let summaries = engine
                .search
                .keyword()
                .search_summaries(&params.query, limit, Some(engine.search.project().to_string()))
                .await
                .map_err(|e| format!("summary search failed: {e}"))?;
            response["summaries"] = serde_json::to_value(summaries).map_err(|e| e.to_string())?;
        }

        Ok(response.to_string())
    }

    /// Chronological context around an observation.
    #[tool(description = "Show observations created just before and after an anchor. Give either 'anchor' (an observation id) or 'query' (the best keyword match becomes the anchor).")]
    async fn timeline(
        &self,
        Parameters(params): Parameters<TimelineParams>,
    ) -> Result<String, String> {
        let anchor = match (params.anchor, params.query) {
            (Some(id), None) => TimelineAnchor::Id(id),
            (None, Some(q)) if !q.trim().is_empty() => TimelineAnchor::Query(q),
            (Some(_), Some(_)) => return Err("give either anchor or query, not both".into()),
            _ => return Err("one of anchor or query is required".into()),
        };
        let depth = self.engines.config().timeline_depth;
        let before = params.depth_before.unwrap_or(depth).min(MAX_LIMIT);
        let after = params.depth_after.unwrap_or(depth).min(MAX_LIMIT);

        let engine = self.engines.get(params.project.as_deref()).map_err(|e| e.to_string())?;
        tracing::info!(?anchor, before, after, "timeline called");

        let result = engine
            .search
            .timeline(anchor, before, after)
            .await
            .map_err(|e| format!("timeline failed: {e}"))?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Health of the keyword and vector paths.
    #[tool(description = "Report search health: current mode, keyword index availability, embedding provider and vector store status, indexed document count and pending indexing work.")]
    async fn search_status(
        &self,
        Parameters(params): Parameters<SearchStatusParams>,
    ) -> Result<String, String> {
        let engine = self.engines.get(params.project.as_deref()).map_err(|e| e.to_string())?;
        let status = engine.search.status().await;

        let mut response = serde_json::to_value(&status).map_err(|e| e.to_string())?;
        response["project"] = engine.search.project().into();
        response["index_queue_depth"] = self.engines.queue_depth().into();
        Ok(response.to_string())
    }
}

#[tool_handler]
impl ServerHandler for CairnTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Cairn is a memory store for coding sessions. Use store_observation to save \
                 what you learn, search to find it again, and timeline to see what happened \
                 around a result."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
