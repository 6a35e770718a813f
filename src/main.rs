// ABOUTME: Entry point for the gantry CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use gantry::config::{self, Config};
use gantry::error::Result;
use gantry::output::{Output, OutputMode};
use gantry::pipeline::{self, Pipeline};
use gantry::runtime::{ContainerFilters, ContainerOps, connect_local};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    if let Err(e) = run(cli, output).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut output: Output) -> Result<()> {
    match cli.command {
        Commands::Init {
            service,
            image,
            force,
        } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, service.as_deref(), image.as_deref(), force)?;
            output.success("Wrote gantry.yml");
            Ok(())
        }
        Commands::Run {
            build_number,
            workspace,
            skip_push,
            force,
        } => {
            let cwd = env::current_dir()?;
            let config = Config::discover(&cwd)?;
            let runtime = connect_local()?;

            output.start_timer();
            output.progress(&format!(
                "Deploying {} build {} ({})",
                config.service, build_number, config.image
            ));

            let report = Pipeline::new(&config, &runtime, workspace, build_number)
                .skip_push(skip_push)
                .force(force)
                .run(&output)
                .await?;

            output.success(&format!(
                "Deployed {} as {} (commit {})",
                report.image, report.container, report.commit
            ));
            Ok(())
        }
        Commands::Rollback => {
            let cwd = env::current_dir()?;
            let config = Config::discover(&cwd)?;
            let runtime = connect_local()?;

            output.start_timer();
            output.progress(&format!("Rolling back {}", config.service));
            pipeline::rollback(&runtime, &config, &output).await?;
            output.success("Rollback complete!");
            Ok(())
        }
        Commands::Status => {
            let cwd = env::current_dir()?;
            let config = Config::discover(&cwd)?;
            let runtime = connect_local()?;

            status(&runtime, &config).await
        }
    }
}

/// Print managed containers for the configured service.
async fn status<R: ContainerOps>(runtime: &R, config: &Config) -> Result<()> {
    let filters = ContainerFilters::for_service(&config.service, true);
    let containers = runtime
        .list_containers(&filters)
        .await
        .map_err(|e| gantry::error::Error::Container(e.to_string()))?;

    println!("Service: {}", config.service);
    println!("Image: {}", config.image);

    if containers.is_empty() {
        println!("No managed containers");
        return Ok(());
    }

    for container in containers {
        let build = container
            .labels
            .get("gantry.build")
            .map(String::as_str)
            .unwrap_or("?");
        println!(
            "  {}  build {}  {}  {}",
            container.name, build, container.state, container.image
        );
    }

    Ok(())
}
