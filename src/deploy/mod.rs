// ABOUTME: Rollover orchestration using the type state pattern.
// ABOUTME: Exports state markers and Deployment struct for compile-time safe releases.

mod deployment;
mod error;
mod lock;
mod rollback;
mod state;
#[cfg(test)]
pub(crate) mod testing;
mod transitions;

pub use deployment::{Deployment, ReleaseSpec};
pub use error::DeployError;
pub use lock::{DeployLock, LockInfo};
pub use rollback::{RollbackReport, manual_rollback};
pub use state::{Completed, HealthChecked, Initialized, OldStopped, Slot, Started};
pub use transitions::TransitionResult;
