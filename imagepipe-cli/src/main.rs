//! imagepipe CLI - Command-line interface
//!
//! Drives the imagepipe library: fetch and decode images, warm the caches,
//! and inspect or clear them.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use imagepipe::logging::{init_logging, LoggingOptions, DEFAULT_LOG_DIR};
use std::path::PathBuf;
use tracing::info;

use commands::cache::CacheAction;
use commands::config::ConfigAction;
use commands::fetch::FetchArgs;
use commands::prefetch::PrefetchArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "imagepipe")]
#[command(version, about = "Fetch, decode and cache images", long_about = None)]
struct Cli {
    /// Config file (default: ~/.imagepipe/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the log file
    #[arg(long, global = true, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Only write log events to the log file
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one image and report what was delivered
    Fetch(FetchArgs),
    /// Warm the disk or memory cache for a list of images
    Prefetch(PrefetchArgs),
    /// Inspect or clear the caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let command = match cli.command {
        Commands::Config { action } => {
            return commands::config::run(action, cli.config.as_deref());
        }
        command => command,
    };

    let options = LoggingOptions::default()
        .with_log_dir(&cli.log_dir)
        .with_console(!cli.quiet);
    let _logging = init_logging(&options).map_err(CliError::LoggingInit)?;
    info!(version = env!("CARGO_PKG_VERSION"), "imagepipe starting");

    let config = commands::common::load_config(cli.config.as_deref())?;
    let pipeline = commands::common::build_pipeline(config)?;

    let result = match command {
        Commands::Fetch(args) => commands::fetch::run(args, &pipeline).await,
        Commands::Prefetch(args) => commands::prefetch::run(args, &pipeline).await,
        Commands::Cache { action } => commands::cache::run(action, &pipeline).await,
        Commands::Config { .. } => Ok(()),
    };

    commands::common::finish(&pipeline).await;
    result
}
