// urlbackup/src/config/cli.rs
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    name = "urlbackup",
    version,
    about = "Rotating SQL Server backups to an S3-compatible container",
    after_help = "\
Values given on the command line override those read from --config.

Example:
  urlbackup -t Full -d sql01 -i -s AKIA... <secret> backups -r 14 -f '^Sales'"
)]
pub struct Cli {
    /// Backup type: Full, Differential or Log
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub backup_type: Option<String>,

    /// SQL Server instance to back up
    #[arg(short = 'd', long = "data-source", value_name = "SERVER")]
    pub data_source: Option<String>,

    /// Use integrated (trusted) authentication
    #[arg(short = 'i', long, conflicts_with = "user")]
    pub integrated: bool,

    /// Use SQL authentication
    #[arg(short = 'u', long = "user", num_args = 2, value_names = ["USERNAME", "PASSWORD"])]
    pub user: Option<Vec<String>>,

    /// Storage account (access key id), secret and container (bucket)
    #[arg(
        short = 's',
        long = "storage",
        num_args = 3,
        value_names = ["ACCOUNT", "SECRET", "CONTAINER"]
    )]
    pub storage: Option<Vec<String>>,

    /// Days to keep backups; -1 disables deletion
    #[arg(short = 'r', long = "retention", value_name = "DAYS", allow_negative_numbers = true)]
    pub retention: Option<i64>,

    /// Only back up and rotate databases whose name matches this regex
    #[arg(short = 'f', long = "filter", value_name = "REGEX")]
    pub filter: Option<String>,

    /// Also back up read-only databases
    #[arg(long)]
    pub include_read_only: bool,

    /// S3 endpoint URL (defaults to AWS)
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// S3 region
    #[arg(long)]
    pub region: Option<String>,

    /// Folder inside the container
    #[arg(long, value_name = "FOLDER")]
    pub prefix: Option<String>,

    /// Path to a JSON configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
