// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use gantry::types::BuildTag;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Single-host build-and-deploy pipeline for Docker and Podman")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output for CI
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// JSON lines output for scripting
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new gantry.yml configuration file
    Init {
        /// Service name for the template
        #[arg(short, long)]
        service: Option<String>,

        /// Image repository for the template
        #[arg(short, long)]
        image: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Run the pipeline: checkout, build, publish, release, prune
    Run {
        /// Numeric build number, also the image tag for this run
        #[arg(short, long, env = "BUILD_NUMBER")]
        build_number: BuildTag,

        /// Directory the source is checked out into
        #[arg(short, long, default_value = "workspace")]
        workspace: PathBuf,

        /// Build and release locally without pushing to the registry
        #[arg(long)]
        skip_push: bool,

        /// Break a held deploy lock
        #[arg(short, long)]
        force: bool,
    },

    /// Swap back to the previous release
    Rollback,

    /// Show managed containers for the service
    Status,
}
