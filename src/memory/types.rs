//! Observation and session-summary records.
//!
//! An [`Observation`] is one thing the assistant noticed during a coding
//! session; it is the unit both retrieval paths rank. [`ObservationType`]
//! is the closed category set the schema enforces.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    /// An architectural or tooling choice and its rationale.
    Decision,
    Bugfix,
    Feature,
    Refactor,
    /// Something learned about the codebase. The default for untyped input.
    Discovery,
}

impl ObservationType {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Bugfix => "bugfix",
            Self::Feature => "feature",
            Self::Refactor => "refactor",
            Self::Discovery => "discovery",
        }
    }
}

impl std::fmt::Display for ObservationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObservationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "decision" => Ok(Self::Decision),
            "bugfix" => Ok(Self::Bugfix),
            "feature" => Ok(Self::Feature),
            "refactor" => Ok(Self::Refactor),
            "discovery" => Ok(Self::Discovery),
            _ => Err(format!("unknown observation type: {s}")),
        }
    }
}

/// A stored observation, matching the `observations` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub memory_session_id: String,
    pub project: String,
    #[serde(rename = "type")]
    pub observation_type: ObservationType,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub narrative: Option<String>,
    /// Raw tool output or free text the observation was distilled from.
    pub text: String,
    pub facts: Vec<String>,
    pub concepts: Vec<String>,
    pub files_read: Vec<String>,
    pub files_modified: Vec<String>,
    pub prompt_number: Option<i64>,
    pub discovery_tokens: i64,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Creation time in Unix milliseconds. Timeline ordering key.
    pub created_at_epoch: i64,
}

/// Input for [`crate::memory::store::insert_observation`]. Timestamps are
/// assigned at insert time unless `created_at_epoch` is given.
#[derive(Debug, Clone, Default)]
pub struct NewObservation {
    pub memory_session_id: String,
    pub project: String,
    pub observation_type: Option<ObservationType>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub narrative: Option<String>,
    pub text: String,
    pub facts: Vec<String>,
    pub concepts: Vec<String>,
    pub files_read: Vec<String>,
    pub files_modified: Vec<String>,
    pub prompt_number: Option<i64>,
    pub created_at_epoch: Option<i64>,
}

/// End-of-session summary, matching the `session_summaries` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub memory_session_id: String,
    pub project: String,
    pub request: Option<String>,
    pub investigated: Option<String>,
    pub learned: Option<String>,
    pub completed: Option<String>,
    pub next_steps: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub created_at_epoch: i64,
}
