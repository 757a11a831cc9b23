// urlbackup/src/backup/selection.rs
use regex::Regex;
use tracing::debug;

use super::naming::BackupKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryModel {
    Full,
    Simple,
    BulkLogged,
    Other,
}

impl RecoveryModel {
    /// Maps `sys.databases.recovery_model_desc`.
    pub fn from_catalog(desc: &str) -> Self {
        match desc.trim().to_ascii_uppercase().as_str() {
            "FULL" => Self::Full,
            "SIMPLE" => Self::Simple,
            "BULK_LOGGED" => Self::BulkLogged,
            _ => Self::Other,
        }
    }
}

/// A backup candidate as reported by the catalog at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDescriptor {
    pub name: String,
    pub is_read_only: bool,
    pub recovery_model: RecoveryModel,
}

/// Pattern over database names. A match anywhere in the name qualifies.
#[derive(Debug, Clone)]
pub struct NameFilter(Regex);

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Narrows the catalog to the databases backed up by this run, keeping the
/// catalog's order.
pub fn select_databases(
    catalog: &[DatabaseDescriptor],
    kind: BackupKind,
    include_read_only: bool,
    name_filter: Option<&NameFilter>,
) -> Vec<DatabaseDescriptor> {
    let mut selected: Vec<&DatabaseDescriptor> = catalog.iter().collect();

    if kind == BackupKind::Log {
        selected.retain(|db| {
            let keep = db.recovery_model == RecoveryModel::Full;
            if !keep {
                debug!(
                    "Excluding {} from log backup: recovery model is {:?}",
                    db.name, db.recovery_model
                );
            }
            keep
        });
    }

    if !include_read_only {
        selected.retain(|db| {
            if db.is_read_only {
                debug!("Excluding {}: database is read only", db.name);
            }
            !db.is_read_only
        });
    }

    if let Some(filter) = name_filter {
        selected.retain(|db| {
            let keep = filter.is_match(&db.name);
            if !keep {
                debug!("Excluding {}: does not match filter '{}'", db.name, filter.as_str());
            }
            keep
        });
    }

    selected.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(name: &str, is_read_only: bool, recovery_model: RecoveryModel) -> DatabaseDescriptor {
        DatabaseDescriptor {
            name: name.to_string(),
            is_read_only,
            recovery_model,
        }
    }

    fn names(selected: &[DatabaseDescriptor]) -> Vec<&str> {
        selected.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_log_backup_excludes_read_only_and_non_full() {
        let catalog = vec![
            db("A", false, RecoveryModel::Full),
            db("B", true, RecoveryModel::Simple),
        ];
        let selected = select_databases(&catalog, BackupKind::Log, false, None);
        assert_eq!(names(&selected), vec!["A"]);
    }

    #[test]
    fn test_log_backup_requires_full_recovery() {
        let catalog = vec![
            db("full", false, RecoveryModel::Full),
            db("simple", false, RecoveryModel::Simple),
            db("bulk", false, RecoveryModel::BulkLogged),
            db("other", false, RecoveryModel::Other),
        ];
        assert_eq!(
            names(&select_databases(&catalog, BackupKind::Log, true, None)),
            vec!["full"]
        );
        assert_eq!(
            names(&select_databases(&catalog, BackupKind::Full, true, None)),
            vec!["full", "simple", "bulk", "other"]
        );
    }

    #[test]
    fn test_read_only_included_on_request() {
        let catalog = vec![
            db("archive", true, RecoveryModel::Simple),
            db("live", false, RecoveryModel::Simple),
        ];
        assert_eq!(
            names(&select_databases(&catalog, BackupKind::Full, true, None)),
            vec!["archive", "live"]
        );
        assert_eq!(
            names(&select_databases(&catalog, BackupKind::Differential, false, None)),
            vec!["live"]
        );
    }

    #[test]
    fn test_name_filter_uses_substring_search() -> anyhow::Result<()> {
        let catalog = vec![
            db("SalesArchive", false, RecoveryModel::Full),
            db("HR", false, RecoveryModel::Full),
            db("OldSales", false, RecoveryModel::Full),
        ];
        let filter = NameFilter::new("Sales")?;
        assert_eq!(
            names(&select_databases(&catalog, BackupKind::Full, false, Some(&filter))),
            vec!["SalesArchive", "OldSales"]
        );
        Ok(())
    }

    #[test]
    fn test_selection_is_stable_and_idempotent() -> anyhow::Result<()> {
        let catalog = vec![
            db("zeta", false, RecoveryModel::Full),
            db("alpha", false, RecoveryModel::Full),
            db("ro", true, RecoveryModel::Full),
            db("mid", false, RecoveryModel::Full),
        ];
        let filter = NameFilter::new("a")?;
        let first = select_databases(&catalog, BackupKind::Log, false, Some(&filter));
        let second = select_databases(&catalog, BackupKind::Log, false, Some(&filter));
        assert_eq!(first, second);
        assert_eq!(names(&first), vec!["zeta", "alpha"]);
        Ok(())
    }

    #[test]
    fn test_empty_results_are_not_errors() {
        assert!(select_databases(&[], BackupKind::Full, false, None).is_empty());

        let catalog = vec![db("ro", true, RecoveryModel::Simple)];
        assert!(select_databases(&catalog, BackupKind::Log, false, None).is_empty());
    }

    #[test]
    fn test_recovery_model_from_catalog() {
        assert_eq!(RecoveryModel::from_catalog("FULL"), RecoveryModel::Full);
        assert_eq!(RecoveryModel::from_catalog("simple"), RecoveryModel::Simple);
        assert_eq!(RecoveryModel::from_catalog("BULK_LOGGED"), RecoveryModel::BulkLogged);
        assert_eq!(RecoveryModel::from_catalog("?"), RecoveryModel::Other);
    }
}
