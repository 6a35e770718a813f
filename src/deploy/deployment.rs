// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: State types carry their own data for compile-time guarantees.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::HealthcheckConfig;
use crate::runtime::RestartPolicyConfig;
use crate::types::{BuildTag, ContainerId, ImageRef, ServiceName};

use super::state::{Completed, HealthChecked, Initialized, Slot, Started};

/// Everything the rollover stage needs to know about one release.
///
/// Built from the config and the build tag before any container is touched,
/// with all environment values already resolved.
#[derive(Debug, Clone)]
pub struct ReleaseSpec {
    /// Service being released.
    pub service: ServiceName,
    /// Image to run, pinned to this build's numeric tag.
    pub image: ImageRef,
    /// Build number for this release.
    pub build: BuildTag,
    /// Resolved environment variables.
    pub env: HashMap<String, String>,
    /// Extra labels from config.
    pub labels: HashMap<String, String>,
    /// Port mapping specs ("host:container" or "host:container/udp").
    pub ports: Vec<String>,
    /// Command override (the launcher command, when configured).
    pub command: Option<Vec<String>>,
    /// Restart policy for the new container.
    pub restart: RestartPolicyConfig,
    /// Readiness probe, if configured.
    pub healthcheck: Option<HealthcheckConfig>,
    /// Overall deadline for the readiness gate.
    pub health_timeout: Duration,
    /// Grace period when stopping containers.
    pub stop_timeout: Duration,
}

/// A rollover in progress, parameterized by its current state.
///
/// The state type parameter `S` carries state-specific data (like the new
/// container's ID) directly in the state type, so a container ID is only
/// accessible in states where it must exist.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) spec: ReleaseSpec,
    pub(crate) old_container: Option<ContainerId>,
    pub(crate) old_was_running: bool,
    pub(crate) target_slot: Slot,
    pub(crate) state: S,
}

impl Deployment<Initialized> {
    /// Create a new deployment (first release, no existing container).
    pub fn new(spec: ReleaseSpec) -> Self {
        Deployment {
            spec,
            old_container: None,
            old_was_running: false,
            target_slot: Slot::first(),
            state: Initialized,
        }
    }

    /// Create a deployment that replaces an existing container.
    ///
    /// `old_slot` is the slot the existing container occupies; the new
    /// container goes into the other one.
    pub fn new_update(
        spec: ReleaseSpec,
        old_container: ContainerId,
        old_was_running: bool,
        old_slot: Slot,
    ) -> Self {
        Deployment {
            spec,
            old_container: Some(old_container),
            old_was_running,
            target_slot: old_slot.other(),
            state: Initialized,
        }
    }
}

impl<S> Deployment<S> {
    /// Get the service name.
    pub fn service_name(&self) -> &ServiceName {
        &self.spec.service
    }

    /// Get the image being released.
    pub fn image(&self) -> &ImageRef {
        &self.spec.image
    }

    /// Get the release spec.
    pub fn spec(&self) -> &ReleaseSpec {
        &self.spec
    }

    /// Get the old container ID (None on first release).
    pub fn old_container(&self) -> Option<&ContainerId> {
        self.old_container.as_ref()
    }

    /// Slot the new container will occupy.
    pub fn target_slot(&self) -> Slot {
        self.target_slot
    }

    /// Name for the new container.
    pub fn container_name(&self) -> String {
        format!("{}-{}", self.spec.service, self.target_slot)
    }
}

// State-specific accessors for the new container ID
impl Deployment<Started> {
    /// Get the new container ID.
    pub fn new_container(&self) -> &ContainerId {
        &self.state.container
    }
}

impl Deployment<HealthChecked> {
    /// Get the new container ID.
    pub fn new_container(&self) -> &ContainerId {
        &self.state.container
    }
}

impl Deployment<Completed> {
    /// Get the new container ID.
    pub fn new_container(&self) -> &ContainerId {
        &self.state.container
    }
}
