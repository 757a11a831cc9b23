pub(crate) mod credential;
mod logic;
pub(crate) mod metadata;
pub(crate) mod naming;
pub(crate) mod report;
pub(crate) mod selection;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};

use crate::config::RunConfig;
use crate::engine::{SqlcmdEngine, TracingSink};
use crate::storage::S3ObjectStore;
use naming::{ArtifactName, BackupKind};

pub use logic::BackupOrchestrator;
pub use report::RunReport;

/// One planned backup, consumed by the orchestrator right after it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub database: String,
    pub kind: BackupKind,
    /// Capture moment, truncated to the second.
    pub timestamp: DateTime<FixedOffset>,
}

impl BackupRequest {
    /// The name carries the timestamp in UTC, so names keep sorting
    /// chronologically across offset changes.
    pub fn artifact_name(&self) -> ArtifactName {
        ArtifactName::format(
            &self.timestamp.with_timezone(&Utc).naive_utc(),
            &self.database,
            self.kind,
        )
    }
}

/// Public entry point for the backup process. Wires the SQL Server engine
/// and the S3 container to the orchestrator and runs it once.
pub async fn run_backup_flow(config: &RunConfig) -> Result<RunReport> {
    let engine = SqlcmdEngine::new(&config.data_source, config.authentication.clone(), TracingSink)
        .context("Failed to prepare the database engine")?;
    let store = S3ObjectStore::connect(&config.storage)
        .await
        .context("Failed to prepare the object store client")?;

    let orchestrator = BackupOrchestrator::new(config, engine, store);
    Ok(orchestrator.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(offset_hours: i32, hour: u32, minute: u32) -> BackupRequest {
        let timestamp = FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 3, hour, minute, 0)
            .unwrap();
        BackupRequest {
            database: "Sales".to_string(),
            kind: BackupKind::Log,
            timestamp,
        }
    }

    #[test]
    fn test_names_sort_chronologically_across_dst_fall_back() {
        // 01:45 EDT, then 30 minutes later 01:15 EST.
        let first = request(-4, 1, 45).artifact_name();
        let second = request(-5, 1, 15).artifact_name();

        assert_eq!(first.as_str(), "20241103_054500_Sales.Log");
        assert_eq!(second.as_str(), "20241103_061500_Sales.Log");
        assert!(first < second);
    }
}
