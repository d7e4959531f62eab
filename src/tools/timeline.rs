//! MCP `timeline` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `timeline` MCP tool. Exactly one of `anchor` and
/// `query` is required.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TimelineParams {
    #[schemars(description = "Observation id to center the timeline on")]
    pub anchor: Option<i64>,

    #[schemars(description = "Find the anchor as the best keyword match for this query")]
    pub query: Option<String>,

    #[schemars(description = "Observations to return before the anchor. Defaults to 3.")]
    pub depth_before: Option<usize>,

    #[schemars(description = "Observations to return after the anchor. Defaults to 3.")]
    pub depth_after: Option<usize>,

    #[schemars(description = "Project to look in. Defaults to the configured project.")]
    pub project: Option<String>,
}
