//! MCP `search` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Natural language or keyword query.
    #[schemars(description = "Search query. Plain words; punctuation is handled safely.")]
    pub query: String,

    /// Filter by observation type.
    #[schemars(
        description = "Filter by type: 'decision', 'bugfix', 'feature', 'refactor', 'discovery'"
    )]
    pub r#type: Option<String>,

    /// Maximum results (1-100). Defaults to the configured limit.
    #[schemars(description = "Maximum number of results (1-100). Defaults to 10.")]
    pub limit: Option<usize>,

    #[schemars(description = "Project to search. Defaults to the configured project.")]
    pub project: Option<String>,

    /// Inclusive lower bound, epoch milliseconds.
    #[schemars(description = "Only observations created at or after this time (epoch ms)")]
    pub date_start: Option<i64>,

    /// Inclusive upper bound, epoch milliseconds.
    #[schemars(description = "Only observations created at or before this time (epoch ms)")]
    pub date_end: Option<i64>,

    #[schemars(description = "Also return keyword matches from session summaries")]
    pub include_summaries: Option<bool>,
}
