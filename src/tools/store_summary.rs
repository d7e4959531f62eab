use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `store_summary` MCP tool. One summary per session;
/// storing again replaces it.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreSummaryParams {
    #[schemars(description = "Memory session id being summarized")]
    pub session_id: String,

    #[schemars(description = "Project name. Defaults to the configured project.")]
    pub project: Option<String>,

    #[schemars(description = "What the user asked for")]
    pub request: Option<String>,

    #[schemars(description = "What was investigated")]
    pub investigated: Option<String>,

    #[schemars(description = "What was learned")]
    pub learned: Option<String>,

    #[schemars(description = "What was completed")]
    pub completed: Option<String>,

    #[schemars(description = "Suggested next steps")]
    pub next_steps: Option<String>,

    #[schemars(description = "Anything else worth keeping")]
    pub notes: Option<String>,
}
