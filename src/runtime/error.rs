// ABOUTME: Aggregate error type for runtime detection and connection.
// ABOUTME: Uses snafu for context-rich error construction.

use super::detection::DetectionError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("runtime detection failed: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("runtime connection failed: {message}"))]
    Connection { message: String },
}
