// ABOUTME: Manual rollback functionality for restoring the previous release.
// ABOUTME: Swaps the active and stopped containers for a service.

use std::time::Duration;

use crate::runtime::{ContainerFilters, ContainerOps, ContainerSummary};
use crate::types::ServiceName;

use super::DeployError;

/// Outcome of a manual rollback.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    /// Name of the container that was serving and is now stopped.
    pub stopped: Option<String>,
    /// Name of the container now serving.
    pub started: String,
}

/// Manual rollback - swap the active and previous containers.
///
/// This function:
/// 1. Finds all gantry-managed containers for the service
/// 2. Identifies the running (active) and stopped (previous) containers
/// 3. Stops the active container, freeing the host port
/// 4. Starts the previous container
///
/// After rollback, what was "previous" becomes "active" and vice versa.
/// This enables ping-pong behavior: double rollback returns to the
/// original state.
///
/// # Errors
///
/// Returns error if there is no stopped container to restore, or if the
/// swap fails. A failed start of the previous container triggers a
/// best-effort restart of the one just stopped.
pub async fn manual_rollback<R: ContainerOps>(
    runtime: &R,
    service: &ServiceName,
) -> Result<RollbackReport, DeployError> {
    let filters = ContainerFilters::for_service(service, true);

    let containers = runtime
        .list_containers(&filters)
        .await
        .map_err(|e| DeployError::RollbackFailed(format!("failed to list containers: {}", e)))?;

    // Separate running (active) and stopped (previous) containers
    let (running, stopped): (Vec<_>, Vec<_>) =
        containers.into_iter().partition(|c| c.state == "running");

    let active = running.into_iter().next();

    // With nothing running both slots may be stopped; the most recent
    // build is the restore target.
    let previous = stopped
        .into_iter()
        .max_by_key(build_label)
        .ok_or_else(|| DeployError::NoPreviousDeployment(service.to_string()))?;

    // Free the host port before starting the previous container
    if let Some(active) = &active {
        runtime
            .stop_container(&active.id, Duration::from_secs(30))
            .await
            .map_err(|e| {
                DeployError::RollbackFailed(format!("failed to stop active container: {}", e))
            })?;
    }

    if let Err(e) = runtime.start_container(&previous.id).await {
        // Try to put the service back the way it was
        if let Some(active) = &active {
            let _ = runtime.start_container(&active.id).await;
        }
        return Err(DeployError::RollbackFailed(format!(
            "failed to start previous container: {}",
            e
        )));
    }

    Ok(RollbackReport {
        stopped: active.map(|c| c.name),
        started: previous.name,
    })
}

fn build_label(container: &ContainerSummary) -> u64 {
    container
        .labels
        .get("gantry.build")
        .and_then(|b| b.parse().ok())
        .unwrap_or(0)
}
