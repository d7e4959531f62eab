use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchStatusParams {
    #[schemars(description = "Project to report on. Defaults to the configured project.")]
    pub project: Option<String>,
}
