use thiserror::Error;

/// Problems with the command line or `config.json`. These are the only errors
/// that abort a run, and they are always raised before any side effect.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Please specify backup type")]
    MissingBackupType,

    #[error("{0}")]
    InvalidBackupType(String),

    #[error("Please specify the data source (SQL Server to backup)")]
    MissingDataSource,

    #[error("Please specify authentication type (either integrated or mixed)")]
    MissingAuthentication,

    #[error("Please specify the storage parameters (storage account, secret and container)")]
    MissingStorage,

    #[error("Please specify the retention days (-1 for unlimited)")]
    MissingRetention,

    #[error("Retention days must be -1 (unlimited) or a non-negative number ({0} is not valid)")]
    InvalidRetention(i64),

    #[error("Invalid name filter '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid endpoint URL '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    File(#[from] anyhow::Error),
}

/// Why the end time of a stored artifact could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata key '{0}' is missing")]
    Missing(&'static str),

    #[error("metadata key '{key}' has malformed value '{value}'")]
    Malformed { key: &'static str, value: String },
}

/// A failure recorded during a run. None of these stop the run; they are
/// collected into the run report and logged.
#[derive(Error, Debug)]
pub enum RunFailure {
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Container unavailable: {0}")]
    ContainerUnavailable(String),

    #[error("Catalog query failed: {0}")]
    CatalogUnavailable(String),

    #[error("Backup of {database} failed: {reason}")]
    BackupOperationFailed { database: String, reason: String },

    #[error("Failed to list artifacts: {0}")]
    ListFailed(String),

    #[error("Failed to delete blob {artifact}: {reason}")]
    DeleteFailed { artifact: String, reason: String },
}

impl RunFailure {
    /// Renders an adapter error with its whole context chain.
    pub fn reason(error: &anyhow::Error) -> String {
        format!("{error:#}")
    }
}
