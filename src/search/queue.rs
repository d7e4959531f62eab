//! Background vector indexing.
//!
//! Storing an observation must not wait on embedding. [`IndexQueue`] hands
//! observations to a worker task that calls [`HybridSearch::index`]; failures
//! are logged there and the observation stays keyword-searchable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::hybrid::HybridSearch;
use crate::memory::types::Observation;

pub struct IndexQueue {
    tx: mpsc::UnboundedSender<Observation>,
    depth: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl IndexQueue {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(search: Arc<HybridSearch>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Observation>();
        let depth = Arc::new(AtomicUsize::new(0));
        let pending = Arc::clone(&depth);

        let worker = tokio::spawn(async move {
            while let Some(observation) = rx.recv().await {
                search.index(&observation).await;
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            tracing::debug!("index queue drained");
        });

        Self { tx, depth, worker }
    }

    /// Queue an observation for indexing. Returns false if the worker has
    /// stopped.
    pub fn enqueue(&self, observation: Observation) -> bool {
        self.depth.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(observation) {
            Ok(()) => true,
            Err(e) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!(id = e.0.id, "index queue closed, observation not indexed");
                false
            }
        }
    }

    /// Observations queued or in flight.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Stop accepting work and wait for queued observations to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "index worker ended abnormally");
        }
    }
}
