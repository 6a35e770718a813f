// ABOUTME: Error types for deployment operations.
// ABOUTME: Covers container lifecycle, health checks, locking, and rollback.

use chrono::{DateTime, Utc};

use crate::runtime::ContainerError;

/// Errors that can occur during deployment state transitions.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Container creation failed.
    #[error("failed to create container: {0}")]
    ContainerCreateFailed(String),

    /// Container start failed.
    #[error("failed to start container: {0}")]
    ContainerStartFailed(String),

    /// Container stop failed.
    #[error("failed to stop container: {0}")]
    ContainerStopFailed(String),

    /// Container removal failed.
    #[error("failed to remove container: {0}")]
    ContainerRemoveFailed(String),

    /// Health check failed.
    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    /// Health check timed out.
    #[error("health check timed out after {0} seconds")]
    HealthCheckTimeout(u64),

    /// Rollback failed.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// No stopped previous container to roll back to.
    #[error("no previous release to roll back to for service: {0}")]
    NoPreviousDeployment(String),

    /// Another deployment holds the lock.
    #[error("deploy lock held by {holder} (pid {pid}) since {started_at}")]
    LockHeld {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    /// Lock file bookkeeping failed.
    #[error("lock error: {0}")]
    LockError(String),

    /// A port mapping spec could not be parsed.
    #[error("invalid port mapping: {0}")]
    InvalidPortSpec(String),
}

impl DeployError {
    pub(crate) fn lock_error(message: String) -> Self {
        DeployError::LockError(message)
    }

    pub(crate) fn lock_held(holder: String, pid: u32, started_at: DateTime<Utc>) -> Self {
        DeployError::LockHeld {
            holder,
            pid,
            started_at,
        }
    }
}

impl From<ContainerError> for DeployError {
    fn from(err: ContainerError) -> Self {
        DeployError::ContainerCreateFailed(err.to_string())
    }
}
