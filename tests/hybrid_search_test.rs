mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use cairn::config::SearchConfig;
use cairn::embedding::EmbeddingProvider;
use cairn::error::Error;
use cairn::memory::types::ObservationType;
use cairn::search::engines::SearchEngines;
use cairn::search::hybrid::{
    record_id, sanitize_collection_name, HybridSearch, SearchMode, SearchOptions, TimelineAnchor,
};
use cairn::search::queue::IndexQueue;
use cairn::vector::sqlite::SqliteVectorStore;
use cairn::vector::{MetadataValue, VectorStore};
use helpers::{
    hybrid_engine, insert_shared, new_observation, shared_db, FailingSearchStore, SpikeEmbedder,
    PROJECT,
};

const HOUR: i64 = 3_600_000;

#[tokio::test]
async fn record_found_by_both_legs_appears_once_with_both_scores() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["reconnect", "tokenizer"]));
    let (search, _store) = hybrid_engine(Arc::clone(&db), Arc::clone(&embedder));

    let both = insert_shared(&db, &new_observation("Fix reconnect", "reconnect backoff reset", HOUR));
    let other = insert_shared(&db, &new_observation("Tokenizer", "greedy prefix match", 2 * HOUR));
    assert!(search.index(&both).await);
    assert!(search.index(&other).await);

    let outcome = search.search("reconnect", 10, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Hybrid);

    let hits: Vec<_> = outcome.results.iter().filter(|r| r.record_id == both.id).collect();
    assert_eq!(hits.len(), 1);
    let hit = hits[0];
    assert!(hit.fts_score > 0.0);
    assert!((hit.vector_score - 1.0).abs() < 1e-5);
    let (vw, tw) = search.weights();
    assert!((hit.hybrid_score - (vw * hit.vector_score + tw * hit.fts_score)).abs() < 1e-6);
    assert_eq!(outcome.results[0].record_id, both.id);

    // Only the vector leg returns the tokenizer note, with a zero similarity
    let vector_only = outcome.results.iter().find(|r| r.record_id == other.id).unwrap();
    assert_eq!(vector_only.fts_score, 0.0);
    assert_eq!(vector_only.vector_score, 0.0);
}

#[tokio::test]
async fn vector_only_hit_is_built_from_metadata() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["alph"]));
    let (search, _store) = hybrid_engine(Arc::clone(&db), Arc::clone(&embedder));

    let mut new = new_observation("Alphabet soup", "letters everywhere", HOUR);
    new.observation_type = Some(ObservationType::Feature);
    let obs = insert_shared(&db, &new);
    assert!(search.index(&obs).await);

    // "alph" is not a token of the document, so FTS misses it
    let outcome = search.search("alph", 5, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Hybrid);
    assert_eq!(outcome.results.len(), 1);

    let hit = &outcome.results[0];
    assert_eq!(hit.record_id, obs.id);
    assert_eq!(hit.title, "Alphabet soup");
    assert_eq!(hit.record_type, "feature");
    assert_eq!(hit.created_at_epoch, HOUR);
    assert!(hit.snippet.starts_with("Title: Alphabet soup"));
    assert_eq!(hit.fts_score, 0.0);
    assert!((hit.hybrid_score - search.weights().0).abs() < 1e-5);
}

#[tokio::test]
async fn keyword_only_record_has_zero_vector_score() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["cache"]));
    let (search, _store) = hybrid_engine(Arc::clone(&db), embedder);

    // Stored but never indexed
    let obs = insert_shared(&db, &new_observation("cache eviction", "entries evicted early", HOUR));

    let outcome = search.search("eviction", 10, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Hybrid);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].record_id, obs.id);
    assert_eq!(outcome.results[0].vector_score, 0.0);
    assert!(outcome.results[0].fts_score > 0.0);
}

#[tokio::test]
async fn failing_vector_store_degrades_to_keyword_only() {
    let db = shared_db();
    let obs = insert_shared(&db, &new_observation("Fix reconnect", "reconnect backoff reset", HOUR));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(SpikeEmbedder::new(&["reconnect"]));
    let search = HybridSearch::new(
        Arc::clone(&db),
        PROJECT,
        Some(embedder),
        Some(Arc::new(FailingSearchStore)),
        &SearchConfig::default(),
    );

    let outcome = search.search("reconnect", 10, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::KeywordOnly);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].record_id, obs.id);
    assert_eq!(outcome.results[0].vector_score, 0.0);
    let (_, tw) = search.weights();
    assert!((outcome.results[0].hybrid_score - tw * outcome.results[0].fts_score).abs() < 1e-6);
}

#[tokio::test]
async fn query_rejected_by_keyword_index_still_returns_vector_hits() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["websocket"]));
    let (search, _store) = hybrid_engine(Arc::clone(&db), Arc::clone(&embedder));

    let obs = insert_shared(&db, &new_observation("Fix reconnect", "websocket backoff reset", HOUR));
    assert!(search.index(&obs).await);

    // A dangling operator is a syntax error for FTS5
    let outcome = search.search("websocket AND", 10, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Hybrid);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].record_id, obs.id);
    assert_eq!(outcome.results[0].fts_score, 0.0);
    assert!(outcome.results[0].vector_score > 0.9);

    let keyword_only = HybridSearch::new(Arc::clone(&db), PROJECT, None, None, &SearchConfig::default());
    for query in ["websocket AND", "OR", "NOT"] {
        let outcome = keyword_only.search(query, 10, &SearchOptions::default()).await.unwrap();
        assert_eq!(outcome.mode, SearchMode::KeywordOnly);
        assert!(outcome.results.is_empty(), "{query:?} returned {:?}", outcome.results);
    }
}

#[tokio::test]
async fn rebuild_resets_collection_after_dimension_change() {
    let db = shared_db();
    let store = Arc::new(SqliteVectorStore::open_in_memory().unwrap());
    let engine_with = |embedder: Arc<SpikeEmbedder>| {
        HybridSearch::new(
            Arc::clone(&db),
            PROJECT,
            Some(embedder as Arc<dyn EmbeddingProvider>),
            Some(Arc::clone(&store) as Arc<dyn VectorStore>),
            &SearchConfig::default(),
        )
    };

    let observations: Vec<_> = (1..=3)
        .map(|i| insert_shared(&db, &new_observation(&format!("cache note {i}"), "cache warmup", i * HOUR)))
        .collect();

    let before = engine_with(Arc::new(SpikeEmbedder::new(&["cache"])));
    assert_eq!(before.index_batch(&observations).await, 3);

    // Switching to a wider model: ordinary initialization refuses
    let after = engine_with(Arc::new(SpikeEmbedder::new(&["cache", "warmup", "eviction"])));
    let err = after.initialize().await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 4 }), "got {err:?}");
    assert_eq!(after.index_batch(&observations).await, 0);

    assert!(after.rebuild().await.unwrap());
    assert_eq!(after.mode(), SearchMode::Hybrid);
    assert_eq!(after.index_batch(&observations).await, 3);

    let info = store.collection_info(after.collection()).await.unwrap().unwrap();
    assert_eq!((info.count, info.dimension), (3, 4));

    let outcome = after.search("warmup", 5, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Hybrid);
    assert_eq!(outcome.results.len(), 3);

    // Same dimension again: nothing is dropped
    assert!(!after.rebuild().await.unwrap());
    let info = store.collection_info(after.collection()).await.unwrap().unwrap();
    assert_eq!(info.count, 3);
}

#[tokio::test]
async fn failing_initialization_degrades_then_recovers() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["reconnect"]).failing_inits(1));
    let (search, _store) = hybrid_engine(Arc::clone(&db), Arc::clone(&embedder));
    insert_shared(&db, &new_observation("Fix reconnect", "reconnect backoff", HOUR));

    assert!(search.initialize().await.is_err());
    assert_eq!(search.mode(), SearchMode::KeywordOnly);

    // The next caller retries initialization and succeeds
    let outcome = search.search("reconnect", 10, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Hybrid);
    assert_eq!(search.mode(), SearchMode::Hybrid);
    assert_eq!(embedder.init_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_first_callers_share_one_initialization() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["x"]));
    let (search, store) = hybrid_engine(db, Arc::clone(&embedder));

    let (a, b, c) = tokio::join!(search.initialize(), search.initialize(), search.initialize());
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(embedder.init_calls.load(Ordering::SeqCst), 1);

    let info = store.collection_info(search.collection()).await.unwrap().unwrap();
    assert_eq!(info.dimension, 2);
}

#[tokio::test]
async fn no_embedder_means_keyword_only() {
    let db = shared_db();
    let obs = insert_shared(&db, &new_observation("Fix reconnect", "backoff", HOUR));
    let search = HybridSearch::new(Arc::clone(&db), PROJECT, None, None, &SearchConfig::default());

    search.initialize().await.unwrap();
    assert!(!search.index(&obs).await);
    assert_eq!(search.index_batch(std::slice::from_ref(&obs)).await, 0);

    let outcome = search.search("backoff", 10, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::KeywordOnly);
    assert_eq!(outcome.results.len(), 1);

    let status = search.status().await;
    assert!(status.fts_available);
    assert!(!status.vector_available);
    assert!(status.embedding_provider.is_none());
}

#[tokio::test]
async fn type_filter_applies_to_both_legs() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["retry"]));
    let (search, _store) = hybrid_engine(Arc::clone(&db), embedder);

    let mut bugfix = new_observation("retry storm", "retry loop fixed", HOUR);
    bugfix.observation_type = Some(ObservationType::Bugfix);
    let bugfix = insert_shared(&db, &bugfix);
    let discovery = insert_shared(&db, &new_observation("retry budget", "retry policy notes", 2 * HOUR));
    assert_eq!(search.index_batch(&[bugfix.clone(), discovery]).await, 2);

    let options = SearchOptions {
        observation_type: Some("Bugfix".into()),
        ..Default::default()
    };
    let outcome = search.search("retry", 10, &options).await.unwrap();
    assert_eq!(outcome.results.iter().map(|r| r.record_id).collect::<Vec<_>>(), vec![bugfix.id]);
}

#[tokio::test]
async fn date_range_excludes_vector_only_hits_outside_it() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["alph"]));
    let (search, _store) = hybrid_engine(Arc::clone(&db), embedder);

    let old = insert_shared(&db, &new_observation("alphabet old", "x", HOUR));
    let recent = insert_shared(&db, &new_observation("alphabet recent", "x", 10 * HOUR));
    assert_eq!(search.index_batch(&[old, recent.clone()]).await, 2);

    let options = SearchOptions {
        date_start: Some(5 * HOUR),
        ..Default::default()
    };
    let outcome = search.search("alph", 10, &options).await.unwrap();
    assert_eq!(outcome.results.iter().map(|r| r.record_id).collect::<Vec<_>>(), vec![recent.id]);
}

#[tokio::test]
async fn batch_indexing_upserts_in_chunks() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["note"]));
    let (search, store) = hybrid_engine(Arc::clone(&db), Arc::clone(&embedder));

    let observations: Vec<_> = (0..250)
        .map(|i| insert_shared(&db, &new_observation(&format!("note {i}"), "body", i * 1000)))
        .collect();

    assert_eq!(search.index_batch(&observations).await, 250);
    let info = store.collection_info(search.collection()).await.unwrap().unwrap();
    assert_eq!(info.count, 250);
    assert_eq!(embedder.embed_calls.load(Ordering::SeqCst), 250);

    // Re-indexing replaces rather than duplicates
    assert_eq!(search.index_batch(&observations[..10]).await, 10);
    let info = store.collection_info(search.collection()).await.unwrap().unwrap();
    assert_eq!(info.count, 250);
}

#[tokio::test]
async fn indexed_metadata_carries_observation_fields() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["reconnect"]));
    let (search, store) = hybrid_engine(Arc::clone(&db), Arc::clone(&embedder));

    let obs = insert_shared(&db, &new_observation("Fix reconnect", "reconnect backoff", HOUR));
    assert!(search.index(&obs).await);

    let query = embedder.vector_for("reconnect");
    let hits = store.search(search.collection(), &query, 1, None).await.unwrap();
    assert_eq!(hits[0].id, record_id(obs.id));
    assert_eq!(hits[0].id, format!("obs_{}", obs.id));
    let m = &hits[0].metadata;
    assert_eq!(m.get("observation_id"), Some(&MetadataValue::Integer(obs.id)));
    assert_eq!(m.get("session_id"), Some(&MetadataValue::from("session-1")));
    assert_eq!(m.get("type"), Some(&MetadataValue::from("discovery")));
    assert_eq!(m.get("project"), Some(&MetadataValue::from(PROJECT)));
    assert_eq!(m.get("created_at_epoch"), Some(&MetadataValue::Integer(HOUR)));
    assert!(m.get("content_preview").is_some());
}

#[tokio::test]
async fn embedding_failure_during_indexing_is_swallowed() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["reconnect"]).failing_embeds());
    let (search, store) = hybrid_engine(Arc::clone(&db), embedder);

    let obs = insert_shared(&db, &new_observation("Fix reconnect", "reconnect backoff", HOUR));
    assert!(!search.index(&obs).await);
    assert_eq!(search.index_batch(std::slice::from_ref(&obs)).await, 0);

    let info = store.collection_info(search.collection()).await.unwrap().unwrap();
    assert_eq!(info.count, 0);

    // Still searchable by keyword; the failing query embedding degrades the mode
    let outcome = search.search("reconnect", 10, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::KeywordOnly);
    assert_eq!(outcome.results[0].record_id, obs.id);
}

#[tokio::test]
async fn timeline_by_id_and_by_query() {
    let db = shared_db();
    let search = HybridSearch::new(Arc::clone(&db), PROJECT, None, None, &SearchConfig::default());
    let a = insert_shared(&db, &new_observation("A", "setup", HOUR));
    let b = insert_shared(&db, &new_observation("B", "migrations landed", 2 * HOUR));
    let c = insert_shared(&db, &new_observation("C", "cleanup", 3 * HOUR));

    let by_id = search.timeline(TimelineAnchor::Id(b.id), 1, 1).await.unwrap();
    assert_eq!(by_id.before[0].id, a.id);
    assert_eq!(by_id.after[0].id, c.id);

    let by_query = search
        .timeline(TimelineAnchor::Query("migrations".into()), 1, 1)
        .await
        .unwrap();
    assert!(by_query.found);
    assert_eq!(by_query.anchor.unwrap().id, b.id);

    let none = search
        .timeline(TimelineAnchor::Query("nothingmatches".into()), 1, 1)
        .await
        .unwrap();
    assert!(!none.found);
}

#[tokio::test]
async fn status_reports_vector_path() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["a", "b"]));
    let (search, _store) = hybrid_engine(Arc::clone(&db), embedder);
    let obs = insert_shared(&db, &new_observation("a note", "body", HOUR));
    assert!(search.index(&obs).await);

    let status = search.status().await;
    assert_eq!(status.mode, SearchMode::Hybrid);
    assert!(status.fts_available);
    assert!(status.vector_available);
    assert_eq!(status.embedding_provider.as_deref(), Some("spike"));
    assert_eq!(status.vector_store.as_deref(), Some("sqlite"));
    assert!(status.embedding_available && status.vector_store_available);
    assert_eq!(status.document_count, Some(1));
    assert_eq!(status.dimension, Some(3));
    assert_eq!(status.collection, sanitize_collection_name(PROJECT));

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["mode"], "hybrid");
}

#[tokio::test]
async fn index_queue_indexes_in_background() {
    let db = shared_db();
    let embedder = Arc::new(SpikeEmbedder::new(&["queued"]));
    let (search, store) = hybrid_engine(Arc::clone(&db), embedder);
    let search = Arc::new(search);

    let queue = IndexQueue::spawn(Arc::clone(&search));
    for i in 0..5 {
        let obs = insert_shared(&db, &new_observation(&format!("queued {i}"), "body", i * 1000));
        assert!(queue.enqueue(obs));
    }
    queue.shutdown().await;

    let info = store.collection_info(search.collection()).await.unwrap().unwrap();
    assert_eq!(info.count, 5);
}

#[tokio::test]
async fn engines_are_cached_per_project() {
    let engines = SearchEngines::new(shared_db(), None, None, SearchConfig::default(), PROJECT);

    let default = engines.get(None).unwrap();
    assert_eq!(default.search.project(), PROJECT);
    assert!(Arc::ptr_eq(&default, &engines.get(Some(PROJECT)).unwrap()));
    assert!(Arc::ptr_eq(&default, &engines.get(Some("  ")).unwrap()));

    let other = engines.get(Some("my-app/api")).unwrap();
    assert_eq!(other.search.collection(), "cm_my_app_api");
    assert_eq!(engines.queue_depth(), 0);
}
