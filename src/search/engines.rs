//! Per-project search engines sharing one database, embedder and store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use super::hybrid::HybridSearch;
use super::queue::IndexQueue;
use crate::config::SearchConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::vector::VectorStore;

/// A project's engine and its background indexing queue.
pub struct ProjectSearch {
    pub search: Arc<HybridSearch>,
    pub queue: IndexQueue,
}

pub struct SearchEngines {
    db: Arc<Mutex<Connection>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn VectorStore>>,
    config: SearchConfig,
    default_project: String,
    projects: Mutex<HashMap<String, Arc<ProjectSearch>>>,
}

impl SearchEngines {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        store: Option<Arc<dyn VectorStore>>,
        config: SearchConfig,
        default_project: &str,
    ) -> Self {
        Self {
            db,
            embedder,
            store,
            config,
            default_project: default_project.to_string(),
            projects: Mutex::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Name of the configured embedding provider, if any.
    pub fn embedder_name(&self) -> Option<&str> {
        self.embedder.as_deref().map(|e| e.name())
    }

    pub fn default_project(&self) -> &str {
        &self.default_project
    }

    /// Engine for `project` (the default project when `None` or blank),
    /// created on first use. Must be called inside a tokio runtime since a
    /// new entry spawns its indexing worker.
    pub fn get(&self, project: Option<&str>) -> Result<Arc<ProjectSearch>> {
        let project = project
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_project);

        let mut projects = self
            .projects
            .lock()
            .map_err(|e| Error::ProviderUnavailable(format!("engine registry lock poisoned: {e}")))?;

        if let Some(entry) = projects.get(project) {
            return Ok(Arc::clone(entry));
        }

        let search = Arc::new(HybridSearch::new(
            Arc::clone(&self.db),
            project,
            self.embedder.clone(),
            self.store.clone(),
            &self.config,
        ));
        let entry = Arc::new(ProjectSearch {
            queue: IndexQueue::spawn(Arc::clone(&search)),
            search,
        });
        tracing::debug!(project, collection = entry.search.collection(), "search engine created");
        projects.insert(project.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Pending background indexing work across all projects.
    pub fn queue_depth(&self) -> usize {
        self.projects
            .lock()
            .map(|p| p.values().map(|e| e.queue.depth()).sum())
            .unwrap_or(0)
    }
}
