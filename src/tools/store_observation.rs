use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreObservationParams {
    #[schemars(description = "Memory session id the observation belongs to")]
    pub session_id: String,

    #[schemars(description = "Project name. Defaults to the configured project.")]
    pub project: Option<String>,

    #[schemars(
        description = "Observation type: 'decision', 'bugfix', 'feature', 'refactor' or 'discovery'. Defaults to 'discovery'."
    )]
    pub r#type: Option<String>,

    #[schemars(description = "Short title")]
    pub title: Option<String>,

    #[schemars(description = "One-line subtitle")]
    pub subtitle: Option<String>,

    #[schemars(description = "What happened and why, in prose")]
    pub narrative: Option<String>,

    #[schemars(description = "Raw observation text")]
    pub text: Option<String>,

    #[schemars(description = "Discrete facts learned")]
    pub facts: Option<Vec<String>>,

    #[schemars(description = "Concepts or tags")]
    pub concepts: Option<Vec<String>>,

    #[schemars(description = "Files read while making the observation")]
    pub files_read: Option<Vec<String>>,

    #[schemars(description = "Files modified while making the observation")]
    pub files_modified: Option<Vec<String>>,

    #[schemars(description = "Prompt number within the session")]
    pub prompt_number: Option<i64>,
}
