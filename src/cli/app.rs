//! Main CLI application structure

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::machine_cmd::{self, MachineArgs};
use super::output::{Output, OutputFormat};
use crate::storage::ReconcilerSettings;

#[derive(Parser)]
#[command(name = "taskgraph")]
#[command(author, version, about = "Drive items to their desired state through a graph of transitions")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// User config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "TASKGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Replans allowed per item before it is abandoned
    #[arg(long, global = true, env = "TASKGRAPH_MAX_REPLANS")]
    pub max_replans: Option<u32>,

    /// Worker threads per pass
    #[arg(long, global = true, env = "TASKGRAPH_WORKERS")]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a machine file and summarize it
    Check {
        /// Path to the machine file
        machine: PathBuf,
    },

    /// Show the planned path of each discrepant item
    Plan {
        /// Path to the machine file
        machine: PathBuf,

        /// Only plan this item
        #[arg(long)]
        item: Option<String>,
    },

    /// Reconcile all items
    Run {
        /// Path to the machine file
        machine: PathBuf,

        /// Maximum number of passes
        #[arg(long, default_value = "1")]
        passes: usize,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = Output::new(cli.format);
    let args = MachineArgs {
        config_path: cli.config.as_deref(),
        overrides: ReconcilerSettings {
            max_replans: cli.max_replans,
            workers: cli.workers,
        },
    };

    match &cli.command {
        Commands::Check { machine } => machine_cmd::check(&output, machine, &args),
        Commands::Plan { machine, item } => {
            machine_cmd::plan(&output, machine, item.as_deref(), &args)
        }
        Commands::Run { machine, passes } => machine_cmd::run(&output, machine, *passes, &args),
    }
}
