// ABOUTME: Library root for gantry - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod runtime;
pub mod scm;
pub mod secrets;
pub mod types;
