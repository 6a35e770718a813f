// ABOUTME: Application server launcher configuration.
// ABOUTME: Renders the fixed server invocation used as the container command.

use serde::Deserialize;
use std::time::Duration;

/// Fixed-configuration invocation of the application server inside the
/// container: one bind address, a static worker pool, a request timeout.
/// No dynamic reconfiguration.
#[derive(Debug, Clone, Deserialize)]
pub struct LauncherConfig {
    #[serde(default = "default_program")]
    pub program: String,

    /// Application object the server binds, e.g. "app:app".
    pub app: String,

    pub bind: String,

    #[serde(default = "default_workers")]
    pub workers: u32,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_program() -> String {
    "gunicorn".to_string()
}

fn default_workers() -> u32 {
    3
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LauncherConfig {
    /// The container command for this invocation.
    pub fn command(&self) -> Vec<String> {
        vec![
            self.program.clone(),
            "--workers".to_string(),
            self.workers.to_string(),
            "--bind".to_string(),
            self.bind.clone(),
            "--timeout".to_string(),
            self.timeout.as_secs().to_string(),
            "--log-level".to_string(),
            self.log_level.clone(),
            self.app.clone(),
        ]
    }
}
