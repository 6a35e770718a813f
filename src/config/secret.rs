// ABOUTME: Secret env-file configuration for the materialization stage.
// ABOUTME: Source path may come from the environment; target is workspace-relative.

use super::env_value::EnvValue;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SecretConfig {
    /// Where the centrally managed env file lives on the build host.
    /// May be a literal path or `{ env: VAR }` when the orchestrator
    /// hands the path down through the environment.
    pub source: EnvValue,

    /// Workspace-relative path the file is copied to for the build and
    /// injected from at deploy time.
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_target() -> String {
    ".env".to_string()
}
