use cairn::error::Error;
use cairn::vector::sqlite::SqliteVectorStore;
use cairn::vector::{Metadata, MetadataValue, VectorRecord, VectorStore};
use tempfile::TempDir;

fn record(id: &str, vector: Vec<f32>, observation_id: i64) -> VectorRecord {
    let mut metadata = Metadata::new();
    metadata.insert("observation_id".into(), observation_id.into());
    VectorRecord {
        id: id.into(),
        vector,
        metadata,
    }
}

#[tokio::test]
async fn collection_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("vectors.db");

    {
        let store = SqliteVectorStore::open(&path).unwrap();
        store.initialize("cm_cairn", 3).await.unwrap();
        store
            .upsert("cm_cairn", &[record("obs_1", vec![1.0, 0.0, 0.0], 1)])
            .await
            .unwrap();
    }
    assert!(path.exists());

    let store = SqliteVectorStore::open(&path).unwrap();
    let info = store.collection_info("cm_cairn").await.unwrap().unwrap();
    assert_eq!((info.count, info.dimension), (1, 3));

    // The declared dimension is persisted and still enforced
    let err = store.initialize("cm_cairn", 4).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 4 }));

    let hits = store.search("cm_cairn", &[1.0, 0.0, 0.0], 5, None).await.unwrap();
    assert_eq!(hits[0].id, "obs_1");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits[0].metadata.get("observation_id"), Some(&MetadataValue::Integer(1)));
}

#[tokio::test]
async fn upsert_same_id_keeps_latest_vector() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteVectorStore::open(tmp.path().join("v.db")).unwrap();
    store.initialize("c", 2).await.unwrap();

    store.upsert("c", &[record("obs_1", vec![1.0, 0.0], 1)]).await.unwrap();
    store.upsert("c", &[record("obs_1", vec![0.0, 1.0], 1)]).await.unwrap();

    let info = store.collection_info("c").await.unwrap().unwrap();
    assert_eq!(info.count, 1);
    let hits = store.search("c", &[0.0, 1.0], 1, None).await.unwrap();
    assert_eq!(hits[0].id, "obs_1");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn wrong_length_batch_is_rejected_whole() {
    let store = SqliteVectorStore::open_in_memory().unwrap();
    store.initialize("c", 2).await.unwrap();

    let batch = [record("obs_1", vec![1.0, 0.0], 1), record("obs_2", vec![1.0, 0.0, 0.0], 2)];
    let err = store.upsert("c", &batch).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
    assert_eq!(store.collection_info("c").await.unwrap().unwrap().count, 0);

    let err = store.search("c", &[1.0], 5, None).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
}

#[tokio::test]
async fn collections_are_isolated() {
    let store = SqliteVectorStore::open_in_memory().unwrap();
    store.initialize("cm_a", 2).await.unwrap();
    store.initialize("cm_b", 2).await.unwrap();
    store.upsert("cm_a", &[record("obs_1", vec![1.0, 0.0], 1)]).await.unwrap();

    assert!(store.search("cm_b", &[1.0, 0.0], 5, None).await.unwrap().is_empty());
    store.delete("cm_b", &["obs_1".into()]).await.unwrap();
    assert_eq!(store.collection_info("cm_a").await.unwrap().unwrap().count, 1);
    assert!(store.collection_info("cm_missing").await.unwrap().is_none());
}
