// ABOUTME: Deploy lock to prevent concurrent pipeline runs for the same service.
// ABOUTME: Uses atomic file creation with lock info stored in ~/.local/state/gantry/.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ServiceName;

use super::DeployError;

/// Base directory for gantry state files (XDG Base Directory compliant).
const STATE_DIR: &str = ".local/state/gantry";

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Service being deployed.
    pub service: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(service: &ServiceName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            service: service.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }
}

fn state_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => Path::new(&home).join(STATE_DIR),
        None => std::env::temp_dir().join("gantry"),
    }
}

fn lock_path(service: &ServiceName) -> PathBuf {
    state_dir().join(format!("{}.lock", service))
}

/// A held deploy lock that releases on drop.
pub struct DeployLock {
    path: PathBuf,
    service: ServiceName,
    released: bool,
}

impl std::fmt::Debug for DeployLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("service", &self.service)
            .finish()
    }
}

impl DeployLock {
    /// Acquire a deploy lock for the given service.
    ///
    /// Uses `O_EXCL` file creation for atomic lock acquisition (no TOCTOU race).
    /// Returns error if the lock is already held by another process.
    /// Auto-breaks stale locks (>1 hour) with a warning.
    pub fn acquire(service: &ServiceName, force: bool) -> Result<Self, DeployError> {
        let path = lock_path(service);

        std::fs::create_dir_all(state_dir()).map_err(|e| {
            DeployError::lock_error(format!("failed to create state directory: {}", e))
        })?;

        let lock_info = LockInfo::new(service);
        let lock_json = serde_json::to_string(&lock_info)
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {}", e)))?;

        if Self::try_create(&path, &lock_json)? {
            return Ok(Self {
                path,
                service: service.clone(),
                released: false,
            });
        }

        // Lock acquisition failed - check if existing lock should be broken
        if !Self::should_break(&path, force)? {
            // Lock is valid and held by someone else
            if let Ok(contents) = std::fs::read_to_string(&path)
                && let Ok(existing) = serde_json::from_str::<LockInfo>(&contents)
            {
                return Err(DeployError::lock_held(
                    existing.holder,
                    existing.pid,
                    existing.started_at,
                ));
            }
            return Err(DeployError::lock_error(
                "lock held by another process".to_string(),
            ));
        }

        // Break the lock and retry
        tracing::debug!("Removing stale/forced lock at {}", path.display());
        let _ = std::fs::remove_file(&path);

        if !Self::try_create(&path, &lock_json)? {
            return Err(DeployError::lock_error(
                "lock acquired by another process during break".to_string(),
            ));
        }

        Ok(Self {
            path,
            service: service.clone(),
            released: false,
        })
    }

    /// Atomically create the lock file. Returns false if it already exists.
    fn try_create(path: &Path, contents: &str) -> Result<bool, DeployError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(contents.as_bytes()).map_err(|e| {
                    DeployError::lock_error(format!("failed to write lock info: {}", e))
                })?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(DeployError::lock_error(format!(
                "failed to acquire lock: {}",
                e
            ))),
        }
    }

    /// Check if an existing lock should be broken (stale, forced, or corrupted).
    fn should_break(path: &Path, force: bool) -> Result<bool, DeployError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                // Can't read lock info - corrupted or already gone, break it
                tracing::warn!("Lock info unreadable, breaking lock");
                return Ok(true);
            }
        };

        match serde_json::from_str::<LockInfo>(&contents) {
            Ok(existing) => {
                if force {
                    tracing::warn!(
                        "Breaking lock held by {} (pid {}) since {}",
                        existing.holder,
                        existing.pid,
                        existing.started_at
                    );
                    Ok(true)
                } else if existing.is_stale() {
                    tracing::warn!(
                        "Auto-breaking stale lock held by {} (pid {}) since {}",
                        existing.holder,
                        existing.pid,
                        existing.started_at
                    );
                    Ok(true)
                } else {
                    // Lock is active and valid
                    Ok(false)
                }
            }
            Err(_) => {
                // Lock info corrupted, break it
                tracing::warn!("Lock info corrupted, breaking lock");
                Ok(true)
            }
        }
    }

    /// Release the lock.
    pub fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        std::fs::remove_file(&self.path)
            .map_err(|e| DeployError::lock_error(format!("failed to release lock: {}", e)))
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let service = ServiceName::new("test-service").unwrap();
        let info = LockInfo::new(&service);

        assert_eq!(info.service, "test-service");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn fresh_lock_is_not_stale() {
        let service = ServiceName::new("test").unwrap();
        let info = LockInfo::new(&service);
        assert!(!info.is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let service = ServiceName::new("test").unwrap();
        let mut info = LockInfo::new(&service);
        // Set to 2 hours ago
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }
}
