// ABOUTME: State transition methods for the rollover stage.
// ABOUTME: Each method consumes self and returns the next state on success.

use std::time::Duration;

use crate::runtime::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerOps, PortMapping, Protocol,
};
use crate::types::ContainerId;

use super::Deployment;
use super::error::DeployError;
use super::state::{Completed, HealthChecked, Initialized, OldStopped, Started};

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<S> {
    /// Internal helper to transition to a new state.
    fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            spec: self.spec,
            old_container: self.old_container,
            old_was_running: self.old_was_running,
            target_slot: self.target_slot,
            state,
        }
    }

    /// Build container configuration for the new release.
    fn build_container_config(&self) -> Result<ContainerConfig, DeployError> {
        let mut labels = self.spec.labels.clone();
        labels.insert("gantry.service".to_string(), self.spec.service.to_string());
        labels.insert("gantry.managed".to_string(), "true".to_string());
        labels.insert("gantry.slot".to_string(), self.target_slot.to_string());
        labels.insert("gantry.build".to_string(), self.spec.build.to_string());

        let ports = self
            .spec
            .ports
            .iter()
            .map(|p| {
                parse_port_mapping(p).ok_or_else(|| DeployError::InvalidPortSpec(p.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ContainerConfig {
            name: self.container_name(),
            image: self.spec.image.clone(),
            env: self.spec.env.clone(),
            labels,
            ports,
            command: self.spec.command.clone(),
            restart_policy: self.spec.restart.clone(),
            stop_timeout: Some(self.spec.stop_timeout),
        })
    }

    /// Restart the old container after a failed release.
    ///
    /// Only containers that were running before the rollover are restarted;
    /// tolerates the old container already running.
    async fn restore_old<R: ContainerOps>(&self, runtime: &R) -> Result<(), DeployError> {
        if let Some(old) = &self.old_container
            && self.old_was_running
        {
            match runtime.start_container(old).await {
                Ok(()) | Err(ContainerError::AlreadyRunning(_)) => {}
                Err(e) => {
                    return Err(DeployError::RollbackFailed(format!(
                        "failed to restart previous container: {}",
                        e
                    )));
                }
            }
        }
        Ok(())
    }

    /// Stop and remove a failed new container, then restart the old one.
    async fn rollback_new_container<R: ContainerOps>(
        &self,
        runtime: &R,
        new_container: Option<&ContainerId>,
    ) -> Result<(), DeployError> {
        if let Some(container_id) = new_container {
            let _ = runtime
                .stop_container(container_id, Duration::from_secs(10))
                .await;
            runtime
                .remove_container(container_id, true)
                .await
                .map_err(|e| DeployError::ContainerRemoveFailed(e.to_string()))?;
        }
        self.restore_old(runtime).await
    }
}

// =============================================================================
// Initialized -> OldStopped
// =============================================================================

impl Deployment<Initialized> {
    /// Stop the currently running container, freeing the host port.
    ///
    /// A missing or already-stopped container is not an error: the port is
    /// free either way.
    #[must_use = "deployment state must be used"]
    pub async fn stop_old<R: ContainerOps>(
        self,
        runtime: &R,
    ) -> Result<Deployment<OldStopped>, DeployError> {
        if let Some(old) = &self.old_container
            && self.old_was_running
        {
            match runtime.stop_container(old, self.spec.stop_timeout).await {
                Ok(()) => {}
                Err(ContainerError::NotFound(_)) | Err(ContainerError::NotRunning(_)) => {}
                Err(e) => return Err(DeployError::ContainerStopFailed(e.to_string())),
            }
        }

        Ok(self.transition(OldStopped))
    }
}

// =============================================================================
// OldStopped -> Started
// =============================================================================

impl Deployment<OldStopped> {
    /// Create and start the new container in the target slot.
    ///
    /// A leftover container occupying the target slot name (from the release
    /// before the previous one) is removed first.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure so the caller can roll back.
    #[must_use = "deployment state must be used"]
    pub async fn start_container<R: ContainerOps>(
        self,
        runtime: &R,
    ) -> TransitionResult<Started, OldStopped> {
        let config = match self.build_container_config() {
            Ok(config) => config,
            Err(e) => return Err((self, e)),
        };

        if let Err(e) = self.remove_slot_occupant(runtime, &config.name).await {
            return Err((self, e));
        }

        let container_id = match runtime.create_container(&config).await {
            Ok(id) => id,
            Err(e) => return Err((self, DeployError::ContainerCreateFailed(e.to_string()))),
        };

        if let Err(e) = runtime.start_container(&container_id).await {
            // Clean up the created container on start failure
            let _ = runtime.remove_container(&container_id, true).await;
            return Err((self, DeployError::ContainerStartFailed(e.to_string())));
        }

        Ok(self.transition(Started {
            container: container_id,
        }))
    }

    /// Rollback: restart the old container.
    pub async fn rollback<R: ContainerOps>(self, runtime: &R) -> Result<(), DeployError> {
        self.restore_old(runtime).await
    }

    /// Remove any container already holding the target slot name.
    async fn remove_slot_occupant<R: ContainerOps>(
        &self,
        runtime: &R,
        name: &str,
    ) -> Result<(), DeployError> {
        let filters = ContainerFilters {
            name: Some(name.to_string()),
            all: true,
            ..Default::default()
        };

        let existing = runtime
            .list_containers(&filters)
            .await
            .map_err(|e| DeployError::ContainerRemoveFailed(e.to_string()))?;

        for container in existing.iter().filter(|c| c.name == name) {
            // The old container keeps its own slot name; never remove it
            if Some(&container.id) == self.old_container.as_ref() {
                continue;
            }
            tracing::debug!(container = %container.name, "Removing stale slot occupant");
            runtime
                .remove_container(&container.id, true)
                .await
                .map_err(|e| DeployError::ContainerRemoveFailed(e.to_string()))?;
        }

        Ok(())
    }
}

// =============================================================================
// Started -> HealthChecked
// =============================================================================

impl Deployment<Started> {
    /// Wait for the readiness probe to pass.
    ///
    /// Probes are triggered actively rather than waiting for the container
    /// runtime to run them, because some runtimes (e.g., rootless Podman
    /// without systemd) don't execute health check commands on their own.
    /// With no probe configured the gate passes immediately.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    #[must_use = "deployment state must be used"]
    pub async fn health_check<R: ContainerOps>(
        self,
        runtime: &R,
        timeout: Duration,
    ) -> TransitionResult<HealthChecked, Started> {
        let container_id = self.state.container.clone();

        let healthcheck = match &self.spec.healthcheck {
            Some(hc) => hc.clone(),
            None => {
                return Ok(self.transition(HealthChecked {
                    container: container_id,
                }));
            }
        };

        // Build the probe command: ["sh", "-c", cmd]
        let probe_cmd = vec!["sh".to_string(), "-c".to_string(), healthcheck.cmd.clone()];

        let start = std::time::Instant::now();
        let poll_interval = healthcheck.interval;
        let mut retries_remaining = healthcheck.retries;

        // Wait for start period before the first probe
        if healthcheck.start_period > Duration::ZERO {
            tokio::time::sleep(healthcheck.start_period).await;
        }

        while start.elapsed() < timeout {
            let probe_result = tokio::time::timeout(
                healthcheck.timeout,
                runtime.run_healthcheck(&container_id, &probe_cmd),
            )
            .await;

            let failure = match probe_result {
                Ok(Ok(true)) => {
                    return Ok(self.transition(HealthChecked {
                        container: container_id,
                    }));
                }
                Ok(Ok(false)) => "container reported unhealthy".to_string(),
                Ok(Err(e)) => format!("probe exec failed: {}", e),
                Err(_elapsed) => "probe timed out".to_string(),
            };

            if retries_remaining == 0 {
                return Err((
                    self,
                    DeployError::HealthCheckFailed(format!(
                        "{} after retries exhausted",
                        failure
                    )),
                ));
            }
            retries_remaining -= 1;

            tokio::time::sleep(poll_interval).await;
        }

        Err((self, DeployError::HealthCheckTimeout(timeout.as_secs())))
    }

    /// Rollback: remove the new container and restart the old one.
    pub async fn rollback<R: ContainerOps>(self, runtime: &R) -> Result<(), DeployError> {
        let new_container = self.state.container.clone();
        self.rollback_new_container(runtime, Some(&new_container))
            .await
    }
}

// =============================================================================
// HealthChecked -> Completed
// =============================================================================

impl Deployment<HealthChecked> {
    /// Finalize the rollover.
    ///
    /// The old container stays stopped in its slot as the rollback target;
    /// nothing is removed here.
    #[must_use = "deployment state must be used"]
    pub fn complete(self) -> Deployment<Completed> {
        let container = self.state.container.clone();
        self.transition(Completed { container })
    }

    /// Rollback: remove the new container and restart the old one.
    pub async fn rollback<R: ContainerOps>(self, runtime: &R) -> Result<(), DeployError> {
        let new_container = self.state.container.clone();
        self.rollback_new_container(runtime, Some(&new_container))
            .await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a port mapping string like "8080:80" or "8080:80/udp".
pub(crate) fn parse_port_mapping(spec: &str) -> Option<PortMapping> {
    let (port_part, protocol) = match spec.split_once('/') {
        Some((ports, "udp")) => (ports, Protocol::Udp),
        Some((ports, "tcp")) => (ports, Protocol::Tcp),
        Some(_) => return None,
        None => (spec, Protocol::Tcp),
    };

    match port_part.split_once(':') {
        Some((host, container)) => {
            let host_port = host.parse().ok()?;
            let container_port = container.parse().ok()?;
            Some(PortMapping {
                host_port: Some(host_port),
                container_port,
                protocol,
                host_ip: None,
            })
        }
        None => {
            // Container port only, no host binding
            let container_port = port_part.parse().ok()?;
            Some(PortMapping {
                host_port: None,
                container_port,
                protocol,
                host_ip: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthcheckConfig;
    use crate::deploy::ReleaseSpec;
    use crate::deploy::state::Slot;
    use crate::deploy::testing::FakeRuntime;
    use crate::runtime::{ContainerState, RestartPolicyConfig};
    use crate::types::{BuildTag, ImageRef, ServiceName};
    use std::collections::HashMap;

    fn spec() -> ReleaseSpec {
        ReleaseSpec {
            service: ServiceName::new("web").unwrap(),
            image: ImageRef::parse("registry.example.com/web").unwrap().with_tag("7"),
            build: BuildTag::new(7).unwrap(),
            env: HashMap::new(),
            labels: HashMap::new(),
            ports: vec!["8000:8000".to_string()],
            command: None,
            restart: RestartPolicyConfig::Always,
            healthcheck: None,
            health_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn first_release_starts_in_blue_slot() {
        let runtime = FakeRuntime::new();
        let deployment = Deployment::new(spec());

        let deployment = deployment.stop_old(&runtime).await.unwrap();
        let deployment = deployment.start_container(&runtime).await.unwrap();
        let deployment = deployment
            .health_check(&runtime, Duration::from_secs(5))
            .await
            .unwrap();
        let completed = deployment.complete();

        assert_eq!(completed.target_slot(), Slot::Blue);
        assert_eq!(runtime.running_names(), vec!["web-blue".to_string()]);
        assert!(
            runtime
                .inspect_container(completed.new_container())
                .await
                .unwrap()
                .labels
                .contains_key("gantry.build")
        );
    }

    #[tokio::test]
    async fn update_targets_other_slot_and_keeps_old_stopped() {
        let runtime = FakeRuntime::new();
        let old_id = runtime.seed("web", "blue", true, 6);

        let deployment = Deployment::new_update(spec(), old_id.clone(), true, Slot::Blue);
        let deployment = deployment.stop_old(&runtime).await.unwrap();
        let deployment = deployment.start_container(&runtime).await.unwrap();
        let deployment = deployment
            .health_check(&runtime, Duration::from_secs(5))
            .await
            .unwrap();
        let completed = deployment.complete();

        assert_eq!(completed.target_slot(), Slot::Green);
        assert_eq!(runtime.running_names(), vec!["web-green".to_string()]);
        // Old container survives, stopped, as the rollback target
        let old = runtime.inspect_container(&old_id).await.unwrap();
        assert_eq!(old.state, ContainerState::Exited);
    }

    #[tokio::test]
    async fn stale_slot_occupant_is_replaced() {
        let runtime = FakeRuntime::new();
        let old_id = runtime.seed("web", "blue", true, 6);
        // Leftover from two releases ago still holds the green slot
        runtime.seed("web", "green", false, 5);

        let deployment = Deployment::new_update(spec(), old_id, true, Slot::Blue);
        let deployment = deployment.stop_old(&runtime).await.unwrap();
        deployment.start_container(&runtime).await.unwrap();

        let names = runtime.names();
        assert_eq!(
            names.iter().filter(|n| n.as_str() == "web-green").count(),
            1
        );
        assert_eq!(runtime.running_names(), vec!["web-green".to_string()]);
    }

    #[tokio::test]
    async fn start_failure_rolls_back_to_old_container() {
        let runtime = FakeRuntime::new();
        let old_id = runtime.seed("web", "blue", true, 6);

        let deployment = Deployment::new_update(spec(), old_id.clone(), true, Slot::Blue);
        let deployment = deployment.stop_old(&runtime).await.unwrap();

        *runtime.fail_start.lock().unwrap() = true;
        let (deployment, err) = deployment.start_container(&runtime).await.unwrap_err();
        assert!(matches!(err, DeployError::ContainerStartFailed(_)));

        *runtime.fail_start.lock().unwrap() = false;
        deployment.rollback(&runtime).await.unwrap();

        // Old container is running again; the failed one is gone
        assert_eq!(runtime.running_names(), vec!["web-blue".to_string()]);
        assert_eq!(runtime.names(), vec!["web-blue".to_string()]);
    }

    #[tokio::test]
    async fn unhealthy_probe_fails_after_retries() {
        let runtime = FakeRuntime::new();
        let mut release = spec();
        release.healthcheck = Some(HealthcheckConfig {
            cmd: "curl -f http://localhost:8000/health".to_string(),
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
            retries: 2,
            start_period: Duration::ZERO,
        });

        *runtime.healthy.lock().unwrap() = false;

        let deployment = Deployment::new(release);
        let deployment = deployment.stop_old(&runtime).await.unwrap();
        let deployment = deployment.start_container(&runtime).await.unwrap();

        let (deployment, err) = deployment
            .health_check(&runtime, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::HealthCheckFailed(_)));

        deployment.rollback(&runtime).await.unwrap();
        assert!(runtime.running_names().is_empty());
    }

    #[tokio::test]
    async fn invalid_port_spec_is_rejected() {
        let runtime = FakeRuntime::new();
        let mut release = spec();
        release.ports = vec!["not-a-port".to_string()];

        let deployment = Deployment::new(release);
        let deployment = deployment.stop_old(&runtime).await.unwrap();
        let (_, err) = deployment.start_container(&runtime).await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidPortSpec(_)));
    }

    #[test]
    fn parses_host_container_port_pairs() {
        let mapping = parse_port_mapping("8000:8080").unwrap();
        assert_eq!(mapping.host_port, Some(8000));
        assert_eq!(mapping.container_port, 8080);
        assert!(matches!(mapping.protocol, Protocol::Tcp));
    }

    #[test]
    fn parses_udp_protocol_suffix() {
        let mapping = parse_port_mapping("514:514/udp").unwrap();
        assert!(matches!(mapping.protocol, Protocol::Udp));
    }

    #[test]
    fn parses_container_only_port() {
        let mapping = parse_port_mapping("9000").unwrap();
        assert_eq!(mapping.host_port, None);
        assert_eq!(mapping.container_port, 9000);
    }

    #[test]
    fn rejects_malformed_port_specs() {
        assert!(parse_port_mapping("abc:80").is_none());
        assert!(parse_port_mapping("80:def").is_none());
        assert!(parse_port_mapping("80:80/sctp").is_none());
    }
}
