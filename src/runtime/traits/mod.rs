// ABOUTME: Composable capability traits for container runtimes.
// ABOUTME: Defines ImageOps and ContainerOps plus their shared types.

mod container;
mod image;
pub(crate) mod sealed;
mod shared_types;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use image::{ImageError, ImageOps, PruneReport};
pub use shared_types::*;
