//! Rotating SQL Server backups
//!
//! Backs up the selected databases of one server straight to an S3-compatible
//! container, tags each artifact with metadata and deletes artifacts older
//! than the retention window.

// urlbackup/src/main.rs
mod backup;
mod config;
mod engine;
mod errors;
mod rotation;
mod storage;
mod utils;

use clap::{CommandFactory, Parser};
use std::process::ExitCode;
use tracing::{debug, error, info};

use config::{Cli, RunConfig};

/// Exit status for an invalid command line or configuration file.
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = utils::logging::init_logger(cli.verbose) {
        eprintln!("{e:#}");
    }

    info!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = match RunConfig::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Syntax error: {e}");
            let _ = Cli::command().print_help();
            return ExitCode::from(EXIT_USAGE);
        }
    };
    debug!("Resolved configuration: {:?}", config);

    match backup::run_backup_flow(&config).await {
        Ok(report) => {
            report.log_summary();
            info!("Backup run completed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
