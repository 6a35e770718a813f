// ABOUTME: Image operations trait for container runtimes.
// ABOUTME: Build, tag, push, prune, and remove container images.

use super::sealed::Sealed;
use super::shared_types::{BuildContext, RegistryAuth};
use crate::types::{ImageId, ImageRef};
use async_trait::async_trait;

/// Image lifecycle operations for the build/publish/cleanup stages.
#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// Build an image from a local context and tag it.
    ///
    /// Returns the id of the built image. A failed build leaves no new
    /// tag behind.
    async fn build_image(
        &self,
        context: &BuildContext,
        tag: &ImageRef,
    ) -> Result<ImageId, ImageError>;

    /// Apply an additional tag to an existing image.
    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ImageError>;

    /// Upload a tagged image to its registry.
    ///
    /// Credentials are sent per request; nothing is cached on the host.
    async fn push_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError>;

    /// Check if an image exists locally.
    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError>;

    /// Remove an image.
    async fn remove_image(&self, reference: &ImageRef, force: bool) -> Result<(), ImageError>;

    /// Remove dangling (untagged) image layers. Tagged images are never touched.
    async fn prune_dangling(&self) -> Result<PruneReport, ImageError>;
}

/// What a prune pass removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneReport {
    pub deleted: usize,
    pub reclaimed_bytes: u64,
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("failed to archive build context: {0}")]
    Context(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("authentication failed for registry: {0}")]
    AuthenticationFailed(String),

    #[error("push failed: {0}")]
    PushFailed(String),

    #[error("image in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
