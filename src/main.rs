// ABOUTME: Entry point for the bootstrapper CLI application.
// ABOUTME: Parses arguments, sets up logging, and dispatches to command handlers.

mod cli;
mod commands;

use bootstrapper::config;
use bootstrapper::error::Result;
use bootstrapper::output::{Output, OutputMode};
use bootstrapper::store::{RunStore, default_state_dir};
use clap::Parser;
use cli::{Cli, Commands};
use commands::{UpOptions, load_config};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from(cli.output);
    if let Err(e) = run(cli).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let output = Output::new(cli.output.into());
    let store = RunStore::new(cli.state_dir.unwrap_or_else(default_state_dir));
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init {
            instance,
            image,
            force,
        } => {
            config::init_config(&cwd, instance.as_deref(), image.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Plan { environment } => {
            let config = load_config(&cwd, environment.as_deref())?;
            commands::plan(&config, &output)
        }
        Commands::Up {
            environment,
            resume,
            rollback,
            rollback_on_cancel,
            dry_run,
            context,
            force,
        } => {
            let config = load_config(&cwd, environment.as_deref())?;
            let opts = UpOptions {
                environment,
                resume,
                rollback,
                rollback_on_cancel,
                dry_run,
                context,
                force,
            };
            commands::up(&config, &store, opts, output).await
        }
        Commands::Down {
            environment,
            context,
            force,
        } => {
            let config = load_config(&cwd, environment.as_deref())?;
            commands::down(&config, &store, context.as_deref(), force, output).await
        }
        Commands::Status { environment } => {
            let config = load_config(&cwd, environment.as_deref())?;
            commands::status(&config, &store, &output)
        }
    }
}
