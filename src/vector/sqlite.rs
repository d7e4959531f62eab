//! Brute-force vector store on SQLite.
//!
//! Each collection is a table `vec_<name>` of `(id, vector BLOB, metadata
//! JSON, created_at)` plus a `vec_<name>_meta` key/value table holding the
//! declared dimension. Vectors are little-endian f32 blobs. Search scans the
//! whole table and ranks by cosine similarity, which is exact and fine for
//! the per-project corpus sizes this store sees.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    bytes_to_vector, check_dimension, cosine_similarity, matches_filter, vector_to_bytes,
    CollectionInfo, Metadata, VectorRecord, VectorSearchResult, VectorStore,
};
use crate::error::{Error, Result};

pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Open (or create) the vector database file.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = crate::db::open_connection(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "vector database opened");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run blocking SQLite work off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| Error::ProviderUnavailable(format!("vector db lock poisoned: {e}")))?;
            f(&mut *guard)
        })
        .await?
    }
}

/// Table name for a collection: `-` and `/` become `_`, anything that is
/// not a letter, digit or `_` is dropped, and the result is lower-cased.
/// SQLite accepts non-ASCII characters in bare identifiers.
pub fn table_name(collection: &str) -> String {
    let cleaned: String = collection
        .chars()
        .map(|c| if c == '-' || c == '/' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    format!("vec_{}", cleaned.to_lowercase())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn stored_dimension(conn: &Connection, table: &str) -> Result<Option<usize>> {
    if !table_exists(conn, &format!("{table}_meta"))? {
        return Ok(None);
    }
    let raw: Option<String> = conn
        .query_row(
            &format!("SELECT value FROM {table}_meta WHERE key = 'dimension'"),
            [],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|v| {
        v.parse::<usize>()
            .map_err(|e| Error::Parse(format!("bad dimension '{v}' in {table}_meta: {e}")))
    })
    .transpose()
}

fn initialize_collection(conn: &Connection, table: &str, dimension: usize) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            vector BLOB NOT NULL,
            metadata TEXT,
            created_at INTEGER DEFAULT (strftime('%s', 'now'))
        );
        CREATE TABLE IF NOT EXISTS {table}_meta (
            key TEXT PRIMARY KEY,
            value TEXT
        );"
    ))?;
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table}_meta (key, value) VALUES ('dimension', ?1)"),
        params![dimension.to_string()],
    )?;

    match stored_dimension(conn, table)? {
        Some(stored) if stored != dimension => Err(Error::DimensionMismatch {
            expected: stored,
            actual: dimension,
        }),
        _ => Ok(()),
    }
}

fn reset_collection(conn: &mut Connection, table: &str, dimension: usize) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table};
        DROP TABLE IF EXISTS {table}_meta;"
    ))?;
    initialize_collection(&tx, table, dimension)?;
    tx.commit()?;
    Ok(())
}

/// All-or-nothing: any failure drops the transaction, which rolls back.
fn upsert_records(conn: &mut Connection, table: &str, records: &[VectorRecord]) -> Result<()> {
    let dimension = stored_dimension(conn, table)?
        .ok_or_else(|| Error::InvalidInput(format!("collection {table} is not initialized")))?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO {table} (id, vector, metadata) VALUES (?1, ?2, ?3)"
        ))?;
        for record in records {
            check_dimension(dimension, &record.vector)?;
            let metadata = serde_json::to_string(&record.metadata)?;
            stmt.execute(params![record.id, vector_to_bytes(&record.vector), metadata])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn scan(
    conn: &Connection,
    table: &str,
    query: &[f32],
    limit: usize,
    filter: Option<&Metadata>,
) -> Result<Vec<VectorSearchResult>> {
    if !table_exists(conn, table)? {
        return Ok(vec![]);
    }
    if let Some(dimension) = stored_dimension(conn, table)? {
        check_dimension(dimension, query)?;
    }

    let mut stmt = conn.prepare(&format!("SELECT id, vector, metadata FROM {table}"))?;
    let mut rows = stmt.query([])?;
    let mut results = Vec::new();

    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        let raw_metadata: Option<String> = row.get(2)?;

        let metadata: Metadata = match raw_metadata.as_deref() {
            None => Metadata::new(),
            Some(json) => match serde_json::from_str(json) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(%id, table, error = %e, "skipping record with malformed metadata");
                    continue;
                }
            },
        };

        if filter.is_some_and(|f| !matches_filter(&metadata, f)) {
            continue;
        }

        let vector = match bytes_to_vector(&blob) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%id, table, error = %e, "skipping record with corrupt vector");
                continue;
            }
        };

        results.push(VectorSearchResult {
            score: cosine_similarity(query, &vector),
            id,
            metadata,
        });
    }

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);
    Ok(results)
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self, collection: &str, dimension: usize) -> Result<()> {
        let table = table_name(collection);
        self.with_conn(move |conn| initialize_collection(conn, &table, dimension))
            .await
    }

    async fn reset(&self, collection: &str, dimension: usize) -> Result<()> {
        let table = table_name(collection);
        self.with_conn(move |conn| reset_collection(conn, &table, dimension))
            .await?;
        tracing::info!(collection, dimension, "vector collection reset");
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let table = table_name(collection);
        let records = records.to_vec();
        let count = records.len();
        self.with_conn(move |conn| upsert_records(conn, &table, &records))
            .await?;
        tracing::debug!(collection, count, "vectors upserted");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<VectorSearchResult>> {
        let table = table_name(collection);
        let query = query.to_vec();
        let filter = filter.cloned();
        self.with_conn(move |conn| scan(conn, &table, &query, limit, filter.as_ref()))
            .await
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = table_name(collection);
        let ids = ids.to_vec();
        self.with_conn(move |conn| {
            if !table_exists(conn, &table)? {
                return Ok(());
            }
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!("DELETE FROM {table} WHERE id = ?1"))?;
                for id in &ids {
                    stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        let table = table_name(collection);
        let name = collection.to_string();
        self.with_conn(move |conn| {
            if !table_exists(conn, &table)? {
                return Ok(None);
            }
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            let dimension = stored_dimension(conn, &table)?.unwrap_or(0);
            Ok(Some(CollectionInfo {
                name,
                count: count as usize,
                dimension,
            }))
        })
        .await
    }

    async fn is_available(&self) -> bool {
        self.with_conn(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
            .await
            .is_ok()
    }
}
