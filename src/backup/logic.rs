// urlbackup/src/backup/logic.rs
use chrono::{DateTime, Local, Timelike, Utc};
use tracing::{debug, info, warn};

use super::credential::TemporaryCredential;
use super::metadata::{BackupMetadata, parse_backup_end_time, tool_identity};
use super::naming::{ArtifactName, parse_artifact_name};
use super::report::RunReport;
use super::selection::{DatabaseDescriptor, select_databases};
use super::BackupRequest;
use crate::config::RunConfig;
use crate::engine::DatabaseEngine;
use crate::errors::RunFailure;
use crate::rotation::{ArtifactListing, Retention, SkipReason, Verdict, artifact_age, should_delete};
use crate::storage::ObjectStore;

/// Runs one backup-and-rotate pass:
/// 1. Ensures the container exists.
/// 2. Creates the temporary credential.
/// 3. Lists and selects databases.
/// 4. Backs up and tags each selected database, one at a time.
/// 5. Drops the temporary credential.
/// 6. Sweeps the container for artifacts past the retention window.
pub struct BackupOrchestrator<'a, E, S> {
    config: &'a RunConfig,
    engine: E,
    store: S,
}

impl<'a, E: DatabaseEngine, S: ObjectStore> BackupOrchestrator<'a, E, S> {
    pub fn new(config: &'a RunConfig, engine: E, store: S) -> Self {
        Self {
            config,
            engine,
            store,
        }
    }

    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();

        debug!("Creating container {} if not existent", self.config.storage.container);
        if let Err(e) = self.store.ensure_container().await {
            report.record(RunFailure::ContainerUnavailable(RunFailure::reason(&e)));
        }

        let credential = TemporaryCredential::acquire(
            &self.engine,
            self.store.credential_scope(),
            &self.config.storage.account,
            &self.config.storage.secret,
            &mut report,
        )
        .await;

        if credential.is_usable() {
            self.backup_phase(credential.token(), &mut report).await;
        } else {
            warn!("Skipping backups: no temp credential available");
        }

        credential.release(&mut report).await;

        self.sweep(Utc::now(), &mut report).await;

        report
    }

    async fn backup_phase(&self, credential: &str, report: &mut RunReport) {
        debug!("Getting database to backup list");
        let catalog = match self.engine.list_databases().await {
            Ok(catalog) => catalog,
            Err(e) => {
                report.record(RunFailure::CatalogUnavailable(RunFailure::reason(&e)));
                return;
            }
        };

        let selected = select_databases(
            &catalog,
            self.config.backup_kind,
            self.config.include_read_only,
            self.config.name_filter.as_ref(),
        );
        report.selected = selected.len();
        info!("{} databases to backup", selected.len());
        if selected.is_empty() {
            warn!(
                "No database qualifies for a {} backup ({} in catalog)",
                self.config.backup_kind,
                catalog.len()
            );
            return;
        }

        let principal = self.config.principal();
        for database in &selected {
            self.backup_one(database, credential, &principal, report).await;
        }
    }

    async fn backup_one(
        &self,
        database: &DatabaseDescriptor,
        credential: &str,
        principal: &str,
        report: &mut RunReport,
    ) {
        info!("Performing backup of {}", database.name);

        let started = Local::now().fixed_offset();
        let request = BackupRequest {
            database: database.name.clone(),
            kind: self.config.backup_kind,
            timestamp: started.with_nanosecond(0).unwrap_or(started),
        };
        let artifact = request.artifact_name();
        info!("Backup will be called {}", artifact);
        if database.name.contains('/') {
            warn!(
                "Database name {} contains '/': the backup lands in a nested folder and is never rotated",
                database.name
            );
        }

        let url = self.store.destination_url(&artifact);
        debug!("Full backup URL {}", url);

        if let Err(e) = self
            .engine
            .backup_to_url(&request.database, request.kind, &url, credential)
            .await
        {
            report.record(RunFailure::BackupOperationFailed {
                database: request.database,
                reason: RunFailure::reason(&e),
            });
            return;
        }

        let finished = Local::now().fixed_offset();
        let metadata =
            BackupMetadata::new(tool_identity(), started, finished, principal, &request.database);
        self.tag(artifact, metadata, report).await;
    }

    async fn tag(&self, artifact: ArtifactName, metadata: BackupMetadata, report: &mut RunReport) {
        match self.store.put_metadata(artifact.as_str(), metadata.to_map()).await {
            Ok(()) => {
                info!("Backup {} completed and tagged", artifact);
                report.backed_up.push(artifact);
            }
            Err(e) => report.record(RunFailure::BackupOperationFailed {
                database: metadata.database_name,
                reason: format!(
                    "backup {} was written but could not be tagged: {}",
                    artifact,
                    RunFailure::reason(&e)
                ),
            }),
        }
    }

    /// Deletes artifacts older than the retention window. Never called with
    /// retention disabled.
    pub(crate) async fn sweep(&self, now: DateTime<Utc>, report: &mut RunReport) {
        if self.config.retention == Retention::Disabled {
            warn!(
                "Backup deletion disabled because retention is set to {}.",
                self.config.retention
            );
            return;
        }

        let policy = self.config.retention_policy();
        let artifacts = match self.store.list_artifacts().await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                report.record(RunFailure::ListFailed(RunFailure::reason(&e)));
                return;
            }
        };

        for name in artifacts {
            debug!("Evaluating {}", name);

            let metadata = match self.store.fetch_metadata(&name).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Could not read metadata of {}: {}", name, RunFailure::reason(&e));
                    report.skipped.push((name, SkipReason::MetadataUnavailable));
                    continue;
                }
            };
            let listing = ArtifactListing { name, metadata };

            match should_delete(&listing, now, &policy) {
                Verdict::Keep => report.kept.push(listing.name),
                Verdict::Skip(reason) => {
                    match parse_artifact_name(&listing.name) {
                        Some(parsed) => info!(
                            "Ignoring blob {} ({} backup of {} taken {}) because of {}",
                            listing.name, parsed.kind, parsed.database, parsed.taken_at, reason
                        ),
                        None => info!("Ignoring blob {} because of {}", listing.name, reason),
                    }
                    report.skipped.push((listing.name, reason));
                }
                Verdict::Delete => self.delete_artifact(listing, now, report).await,
            }
        }
    }

    async fn delete_artifact(&self, listing: ArtifactListing, now: DateTime<Utc>, report: &mut RunReport) {
        let age_days = listing
            .metadata
            .as_ref()
            .and_then(|m| parse_backup_end_time(m).ok())
            .map(|end| artifact_age(end, now).num_seconds() as f64 / 86_400.0)
            .unwrap_or_default();
        warn!(
            "Backup {} was taken {:.2} days ago. It will be deleted",
            listing.name, age_days
        );

        match self.store.delete(&listing.name).await {
            Ok(()) => {
                debug!("Backup {} deleted", listing.name);
                report.deleted.push(listing.name);
            }
            Err(e) => report.record(RunFailure::DeleteFailed {
                artifact: listing.name,
                reason: RunFailure::reason(&e),
            }),
        }
    }
}
