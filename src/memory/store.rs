//! Observation repository: the write path and the lookups the retrieval
//! core needs. The FTS5 index is maintained by triggers, so nothing here
//! touches `observations_fts` directly.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::memory::types::{NewObservation, Observation, ObservationType, SessionSummary};

const OBSERVATION_COLUMNS: &str = "id, memory_session_id, project, type, title, subtitle, narrative, text, \
     facts, concepts, files_read, files_modified, prompt_number, discovery_tokens, \
     created_at, created_at_epoch";

/// Insert an observation and return its row id.
pub fn insert_observation(conn: &Connection, obs: &NewObservation) -> Result<i64> {
    if obs.memory_session_id.is_empty() {
        return Err(Error::InvalidInput("memory_session_id must not be empty".into()));
    }
    if obs.project.is_empty() {
        return Err(Error::InvalidInput("project must not be empty".into()));
    }

    let (created_at, created_at_epoch) = timestamps(obs.created_at_epoch);
    let observation_type = obs.observation_type.unwrap_or(ObservationType::Discovery);

    conn.execute(
        "INSERT INTO observations (memory_session_id, project, type, title, subtitle, narrative, text, \
         facts, concepts, files_read, files_modified, prompt_number, discovery_tokens, created_at, created_at_epoch) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, ?13, ?14)",
        params![
            obs.memory_session_id,
            obs.project,
            observation_type.as_str(),
            obs.title,
            obs.subtitle,
            obs.narrative,
            obs.text,
            serde_json::to_string(&obs.facts)?,
            serde_json::to_string(&obs.concepts)?,
            serde_json::to_string(&obs.files_read)?,
            serde_json::to_string(&obs.files_modified)?,
            obs.prompt_number,
            created_at,
            created_at_epoch,
        ],
    )?;

    let id = conn.last_insert_rowid();
    tracing::debug!(id, project = %obs.project, r#type = %observation_type, "observation stored");
    Ok(id)
}

pub fn get_observation(conn: &Connection, id: i64) -> Result<Option<Observation>> {
    let sql = format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], map_observation).optional()?)
}

/// Most recent observations first, optionally scoped to one project.
pub fn list_observations(
    conn: &Connection,
    project: Option<&str>,
    limit: usize,
) -> Result<Vec<Observation>> {
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM observations \
         WHERE (?1 IS NULL OR project = ?1) \
         ORDER BY created_at_epoch DESC, id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![project, limit as i64], map_observation)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_observations(conn: &Connection, project: Option<&str>) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM observations WHERE (?1 IS NULL OR project = ?1)",
        params![project],
        |row| row.get(0),
    )?)
}

/// Insert a session summary. One summary per memory session; re-summarizing
/// a session replaces the previous row.
pub fn insert_summary(conn: &Connection, summary: &SessionSummary) -> Result<i64> {
    let epoch = (summary.created_at_epoch > 0).then_some(summary.created_at_epoch);
    let (created_at, created_at_epoch) = timestamps(epoch);

    // Upsert rather than OR REPLACE: REPLACE deletes without firing the
    // FTS delete trigger.
    let id = conn.query_row(
        "INSERT INTO session_summaries (memory_session_id, project, request, investigated, \
         learned, completed, next_steps, notes, created_at, created_at_epoch) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT(memory_session_id) DO UPDATE SET \
           project = excluded.project, request = excluded.request, \
           investigated = excluded.investigated, learned = excluded.learned, \
           completed = excluded.completed, next_steps = excluded.next_steps, \
           notes = excluded.notes, created_at = excluded.created_at, \
           created_at_epoch = excluded.created_at_epoch \
         RETURNING id",
        params![
            summary.memory_session_id,
            summary.project,
            summary.request,
            summary.investigated,
            summary.learned,
            summary.completed,
            summary.next_steps,
            summary.notes,
            created_at,
            created_at_epoch,
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn timestamps(epoch_ms: Option<i64>) -> (String, i64) {
    let at = epoch_ms
        .and_then(chrono::DateTime::from_timestamp_millis)
        .unwrap_or_else(chrono::Utc::now);
    (at.to_rfc3339(), at.timestamp_millis())
}

fn json_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

fn map_observation(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let type_str: String = row.get(3)?;
    let observation_type = type_str.parse::<ObservationType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Observation {
        id: row.get(0)?,
        memory_session_id: row.get(1)?,
        project: row.get(2)?,
        observation_type,
        title: row.get(4)?,
        subtitle: row.get(5)?,
        narrative: row.get(6)?,
        text: row.get(7)?,
        facts: json_list(row.get(8)?),
        concepts: json_list(row.get(9)?),
        files_read: json_list(row.get(10)?),
        files_modified: json_list(row.get(11)?),
        prompt_number: row.get(12)?,
        discovery_tokens: row.get(13)?,
        created_at: row.get(14)?,
        created_at_epoch: row.get(15)?,
    })
}
