// ABOUTME: Container runtime access for Docker and Podman.
// ABOUTME: Capability traits plus the bollard-backed implementation.

mod bollard;
mod detection;
mod error;
mod traits;
mod types;

pub use bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local};
pub use error::RuntimeError;
pub use traits::*;
pub use types::{RuntimeSocket, RuntimeType};

pub(crate) use error::{ConnectionSnafu, DetectionSnafu};
pub(crate) use traits::sealed::Sealed;

use snafu::ResultExt;

/// Detect the local runtime socket and connect to it.
pub fn connect_local() -> Result<BollardRuntime, RuntimeError> {
    let socket = detect_local().context(DetectionSnafu)?;
    tracing::debug!(runtime = %socket.runtime_type, socket = %socket.socket_path, "detected runtime");
    BollardRuntime::connect(&socket)
}
