// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments, and global output flags.

use bootstrapper::output::OutputMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bootstrapper")]
#[command(about = "Bootstrap a messaging platform deployment onto a Kubernetes cluster")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Normal, global = true)]
    pub output: OutputFormat,

    /// Directory for run snapshots and locks
    #[arg(long, global = true, env = "BOOTSTRAPPER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Normal,
    Quiet,
    Json,
}

impl From<OutputFormat> for OutputMode {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Normal => OutputMode::Normal,
            OutputFormat::Quiet => OutputMode::Quiet,
            OutputFormat::Json => OutputMode::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new bootstrap.yml configuration file
    Init {
        /// Instance name
        #[arg(long)]
        instance: Option<String>,

        /// Image of the first application service
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the ordered resource plan without touching the cluster
    Plan {
        /// Environment overlay (defined in config)
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Converge the cluster toward the configured deployment
    Up {
        /// Environment overlay (defined in config)
        #[arg(short, long)]
        environment: Option<String>,

        /// Continue the last interrupted run instead of starting over
        #[arg(long)]
        resume: bool,

        /// Tear down created resources if the run fails
        #[arg(long)]
        rollback: bool,

        /// Tear down created resources when cancelled with Ctrl-C
        #[arg(long)]
        rollback_on_cancel: bool,

        /// Simulate the run against an in-memory control plane
        #[arg(long)]
        dry_run: bool,

        /// Kubeconfig context to use
        #[arg(long)]
        context: Option<String>,

        /// Break an existing run lock
        #[arg(long)]
        force: bool,
    },

    /// Delete every resource of the configured deployment
    Down {
        /// Environment overlay (defined in config)
        #[arg(short, long)]
        environment: Option<String>,

        /// Kubeconfig context to use
        #[arg(long)]
        context: Option<String>,

        /// Break an existing run lock
        #[arg(long)]
        force: bool,
    },

    /// Show the last recorded run
    Status {
        /// Environment overlay (defined in config)
        #[arg(short, long)]
        environment: Option<String>,
    },
}
