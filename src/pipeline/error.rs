// ABOUTME: Error type for pipeline stage failures.
// ABOUTME: Each variant names the stage that failed.

use crate::deploy::DeployError;
use crate::runtime::ImageError;
use crate::scm::ScmError;
use crate::secrets::SecretError;

/// Errors from pipeline stages, in stage order.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("checkout failed: {0}")]
    Checkout(#[from] ScmError),

    #[error("secret staging failed: {0}")]
    Secrets(#[from] SecretError),

    #[error("build failed: {0}")]
    Build(#[source] ImageError),

    #[error("publish failed: {0}")]
    Publish(#[source] ImageError),

    #[error("release failed: {0}")]
    Release(#[from] DeployError),

    #[error("configuration error: {0}")]
    Config(String),
}
