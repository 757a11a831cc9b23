// urlbackup/src/backup/report.rs
use tracing::{error, info, warn};

use super::naming::ArtifactName;
use crate::errors::RunFailure;
use crate::rotation::SkipReason;

/// Outcome of one run. Failures are collected here instead of aborting.
#[derive(Debug, Default)]
pub struct RunReport {
    pub selected: usize,
    pub backed_up: Vec<ArtifactName>,
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failures: Vec<RunFailure>,
}

impl RunReport {
    pub fn record(&mut self, failure: RunFailure) {
        error!("{failure}");
        self.failures.push(failure);
    }

    pub fn backup_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f, RunFailure::BackupOperationFailed { .. }))
            .count()
    }

    pub fn log_summary(&self) {
        info!(
            "{} of {} selected databases backed up, {} failed",
            self.backed_up.len(),
            self.selected,
            self.backup_failures()
        );
        info!(
            "Retention: {} deleted, {} kept, {} skipped",
            self.deleted.len(),
            self.kept.len(),
            self.skipped.len()
        );
        if !self.failures.is_empty() {
            warn!("Run completed with {} recorded failure(s):", self.failures.len());
            for failure in &self.failures {
                warn!("  {failure}");
            }
        }
    }
}
