// ABOUTME: Source repository configuration for the checkout stage.
// ABOUTME: Remote URL plus the branch the pipeline tracks.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Remote repository URL (anything git understands).
    pub url: String,

    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}
