// urlbackup/src/engine/mod.rs
pub(crate) mod sqlcmd;

use anyhow::Result;
use tracing::info;

use crate::backup::naming::BackupKind;
use crate::backup::selection::DatabaseDescriptor;

pub use sqlcmd::SqlcmdEngine;

/// Receives informational messages emitted by the database engine while it
/// works (progress lines, completion notices).
pub trait DiagnosticSink {
    fn message(&self, message: &str);
}

/// Forwards engine messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn message(&self, message: &str) {
        info!("{message}");
    }
}

/// The database server being backed up.
pub trait DatabaseEngine {
    async fn list_databases(&self) -> Result<Vec<DatabaseDescriptor>>;

    /// Creates the credential the server uses for URLs starting with `name`.
    async fn create_credential(&self, name: &str, access_key_id: &str, secret: &str) -> Result<()>;

    /// Must succeed when the credential does not exist.
    async fn drop_credential(&self, name: &str) -> Result<()>;

    /// `credential` is the name of the credential covering `url`.
    async fn backup_to_url(
        &self,
        database: &str,
        kind: BackupKind,
        url: &str,
        credential: &str,
    ) -> Result<()>;
}
