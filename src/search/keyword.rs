use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Error, Result};

// ── Public types ──────────────────────────────────────────────────────────────

/// One FTS5 hit. `rank` is the raw bm25() value: lower is more relevant.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordSearchResult {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub project: String,
    pub created_at_epoch: i64,
    pub rank: f64,
    /// Best-matching column excerpt with `<mark>` highlights.
    pub snippet: String,
}

impl KeywordSearchResult {
    /// `1 / (1 + max(0, -rank))`, in (0, 1].
    pub fn normalized_score(&self) -> f32 {
        normalize_rank(self.rank)
    }
}

pub fn normalize_rank(rank: f64) -> f32 {
    1.0 / (1.0 + (-rank as f32).max(0.0))
}

/// Optional narrowing for [`search_observations`]. Type strings are
/// compared lower-cased.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub observation_type: Option<String>,
    pub project: Option<String>,
    /// Inclusive lower bound on `created_at_epoch` (ms).
    pub date_start: Option<i64>,
    /// Inclusive upper bound on `created_at_epoch` (ms).
    pub date_end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineItem {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub project: String,
    pub created_at_epoch: i64,
}

/// Records around an anchor, both sides in chronological order. The anchor
/// itself appears in neither list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimelineResult {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<TimelineItem>,
    pub before: Vec<TimelineItem>,
    pub after: Vec<TimelineItem>,
}

// ── Query sanitization ────────────────────────────────────────────────────────

/// Prepare user text for FTS5 MATCH.
///
/// Double quotes are doubled. If the text contains anything other than
/// alphanumerics, `_` and whitespace (which covers the FTS5 operator set
/// `+ - * ( ) { } [ ] ^ ~ :` and `"`), the whole query is wrapped in quotes
/// so it is matched as a phrase. Blank input yields an empty string.
pub fn escape_fts_query(query: &str) -> String {
    if query.trim().is_empty() {
        return String::new();
    }
    let escaped = query.replace('"', "\"\"");
    let needs_quoting = escaped
        .chars()
        .any(|c| !(c.is_alphanumeric() || c == '_' || c.is_whitespace()));
    if needs_quoting {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

/// FTS5 reports grammar problems as generic SQLite errors; surface those as
/// [`Error::Query`] so callers can tell a bad query from a broken database.
fn map_fts_error(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(_, Some(msg))
            if msg.contains("fts5") || msg.contains("syntax error") || msg.contains("no such column") =>
        {
            Error::Query(msg.clone())
        }
        _ => Error::Database(e),
    }
}

// ── Search ────────────────────────────────────────────────────────────────────

fn map_result(row: &Row<'_>) -> rusqlite::Result<KeywordSearchResult> {
    Ok(KeywordSearchResult {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        record_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        project: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        created_at_epoch: row.get(4)?,
        rank: row.get(5)?,
        snippet: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    })
}

/// BM25-ranked observation search. Empty or blank queries return nothing
/// without touching the index.
pub fn search_observations(
    conn: &Connection,
    query: &str,
    limit: usize,
    filters: &SearchFilters,
) -> Result<Vec<KeywordSearchResult>> {
    let escaped = escape_fts_query(query);
    if escaped.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT o.id, o.title, o.type, o.project, o.created_at_epoch, \
                bm25(observations_fts) AS rank, \
                snippet(observations_fts, -1, '<mark>', '</mark>', '...', 64) AS snippet \
         FROM observations_fts \
         JOIN observations o ON observations_fts.rowid = o.id \
         WHERE observations_fts MATCH ?1 \
           AND (?2 IS NULL OR o.type = ?2) \
           AND (?3 IS NULL OR o.project = ?3) \
           AND (?4 IS NULL OR o.created_at_epoch >= ?4) \
           AND (?5 IS NULL OR o.created_at_epoch <= ?5) \
         ORDER BY rank LIMIT ?6",
    )?;

    let type_filter = filters.observation_type.as_deref().map(str::to_lowercase);
    let results = stmt
        .query_map(
            params![
                escaped,
                type_filter,
                filters.project,
                filters.date_start,
                filters.date_end,
                limit as i64
            ],
            map_result,
        )
        .map_err(map_fts_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_fts_error)?;

    tracing::debug!(query, hits = results.len(), "keyword search");
    Ok(results)
}

/// BM25-ranked search over session summaries. Results carry type `summary`
/// and the summary's request as title.
pub fn search_summaries(
    conn: &Connection,
    query: &str,
    limit: usize,
    project: Option<&str>,
) -> Result<Vec<KeywordSearchResult>> {
    let escaped = escape_fts_query(query);
    if escaped.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT s.id, s.request, 'summary', s.project, s.created_at_epoch, \
                bm25(summaries_fts) AS rank, \
                snippet(summaries_fts, -1, '<mark>', '</mark>', '...', 64) AS snippet \
         FROM summaries_fts \
         JOIN session_summaries s ON summaries_fts.rowid = s.id \
         WHERE summaries_fts MATCH ?1 \
           AND (?2 IS NULL OR s.project = ?2) \
         ORDER BY rank LIMIT ?3",
    )?;

    let results = stmt
        .query_map(params![escaped, project, limit as i64], map_result)
        .map_err(map_fts_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_fts_error)?;
    Ok(results)
}

// ── Timeline ──────────────────────────────────────────────────────────────────

fn map_item(row: &Row<'_>) -> rusqlite::Result<TimelineItem> {
    Ok(TimelineItem {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        record_type: row.get(2)?,
        project: row.get(3)?,
        created_at_epoch: row.get(4)?,
    })
}

/// Up to `depth_before` records strictly older than the anchor and up to
/// `depth_after` strictly newer, both in chronological order. A missing
/// anchor gives `found = false` and nothing else.
pub fn timeline(
    conn: &Connection,
    anchor_id: i64,
    depth_before: usize,
    depth_after: usize,
    project: Option<&str>,
) -> Result<TimelineResult> {
    let anchor = conn
        .query_row(
            "SELECT id, title, type, project, created_at_epoch FROM observations WHERE id = ?1",
            params![anchor_id],
            map_item,
        )
        .optional()?;

    let Some(anchor) = anchor else {
        return Ok(TimelineResult::default());
    };

    let mut before = conn
        .prepare(
            "SELECT id, title, type, project, created_at_epoch FROM observations \
             WHERE created_at_epoch < ?1 AND (?2 IS NULL OR project = ?2) \
             ORDER BY created_at_epoch DESC, id DESC LIMIT ?3",
        )?
        .query_map(params![anchor.created_at_epoch, project, depth_before as i64], map_item)?
        .collect::<Result<Vec<_>, _>>()?;
    before.reverse();

    let after = conn
        .prepare(
            "SELECT id, title, type, project, created_at_epoch FROM observations \
             WHERE created_at_epoch > ?1 AND (?2 IS NULL OR project = ?2) \
             ORDER BY created_at_epoch ASC, id ASC LIMIT ?3",
        )?
        .query_map(params![anchor.created_at_epoch, project, depth_after as i64], map_item)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TimelineResult {
        found: true,
        anchor: Some(anchor),
        before,
        after,
    })
}

/// Id of the single best keyword match, if any.
pub fn find_anchor_by_query(conn: &Connection, query: &str, project: Option<&str>) -> Result<Option<i64>> {
    let filters = SearchFilters {
        project: project.map(str::to_string),
        ..Default::default()
    };
    Ok(search_observations(conn, query, 1, &filters)?
        .first()
        .map(|r| r.id))
}

// ── Async handle ──────────────────────────────────────────────────────────────

/// Keyword search over the shared observation connection. Each call runs on
/// the blocking pool.
#[derive(Clone)]
pub struct KeywordSearch {
    db: Arc<Mutex<Connection>>,
}

impl KeywordSearch {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| Error::ProviderUnavailable(format!("db lock poisoned: {e}")))?;
            f(&*conn)
        })
        .await?
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filters: SearchFilters,
    ) -> Result<Vec<KeywordSearchResult>> {
        let query = query.to_string();
        self.run(move |conn| search_observations(conn, &query, limit, &filters))
            .await
    }

    pub async fn search_summaries(
        &self,
        query: &str,
        limit: usize,
        project: Option<String>,
    ) -> Result<Vec<KeywordSearchResult>> {
        let query = query.to_string();
        self.run(move |conn| search_summaries(conn, &query, limit, project.as_deref()))
            .await
    }

    pub async fn timeline(
        &self,
        anchor_id: i64,
        depth_before: usize,
        depth_after: usize,
        project: Option<String>,
    ) -> Result<TimelineResult> {
        self.run(move |conn| timeline(conn, anchor_id, depth_before, depth_after, project.as_deref()))
            .await
    }

    pub async fn find_anchor_by_query(&self, query: &str, project: Option<String>) -> Result<Option<i64>> {
        let query = query.to_string();
        self.run(move |conn| find_anchor_by_query(conn, &query, project.as_deref()))
            .await
    }

    /// True when the observation index answers a trivial query.
    pub async fn is_available(&self) -> bool {
        self.run(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM observations_fts WHERE rowid = 0", [], |row| {
                row.get::<_, i64>(0)
            })?)
        })
        .await
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_leaves_plain_words() {
        assert_eq!(escape_fts_query("websocket reconnect"), "websocket reconnect");
        assert_eq!(escape_fts_query("snake_case"), "snake_case");
    }

    #[test]
    fn escape_quotes_operator_characters() {
        for op in ["+", "-", "*", "(", ")", "{", "}", "[", "]", "^", "~", ":"] {
            let q = format!("a{op}b");
            assert_eq!(escape_fts_query(&q), format!("\"{q}\""), "operator {op}");
        }
    }

    #[test]
    fn escape_doubles_quotes_and_wraps() {
        assert_eq!(escape_fts_query(r#"say "hi""#), r#""say ""hi""""#);
    }

    #[test]
    fn escape_blank_is_empty() {
        assert_eq!(escape_fts_query(""), "");
        assert_eq!(escape_fts_query("   \t"), "");
    }

    #[test]
    fn normalized_score_formula() {
        assert_eq!(normalize_rank(0.0), 1.0);
        assert_eq!(normalize_rank(-1.0), 0.5);
        assert_eq!(normalize_rank(-3.0), 0.25);
        // Positive ranks clamp to 1.
        assert_eq!(normalize_rank(2.0), 1.0);
    }
}
