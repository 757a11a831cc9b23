// urlbackup/src/backup/credential.rs
use tracing::{error, info};

use super::report::RunReport;
use crate::engine::DatabaseEngine;
use crate::errors::RunFailure;

/// Run-scoped credential letting the engine write to the object store.
///
/// Create it with [`TemporaryCredential::acquire`] and hand it back with
/// [`TemporaryCredential::release`], which drops it on the server exactly
/// once. Dropping the value without releasing it is a bug and is logged.
pub struct TemporaryCredential<'e, E: DatabaseEngine> {
    engine: &'e E,
    token: String,
    created: bool,
    released: bool,
}

impl<'e, E: DatabaseEngine> TemporaryCredential<'e, E> {
    /// Creates the credential named `token`, the URL prefix every backup of
    /// this run is written under. A creation failure is recorded; the
    /// returned value must still be released.
    pub async fn acquire(
        engine: &'e E,
        token: String,
        access_key_id: &str,
        secret: &str,
        report: &mut RunReport,
    ) -> Self {
        info!("Creating temp credential: {}", token);

        let created = match engine.create_credential(&token, access_key_id, secret).await {
            Ok(()) => true,
            Err(e) => {
                report.record(RunFailure::Credential(format!(
                    "failed to create temp credential {token}: {}",
                    RunFailure::reason(&e)
                )));
                false
            }
        };

        Self {
            engine,
            token,
            created,
            released: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_usable(&self) -> bool {
        self.created && !self.released
    }

    /// Drops the credential on the server. Always issued, even if creation
    /// failed, since the drop is a no-op for a missing credential.
    pub async fn release(mut self, report: &mut RunReport) {
        info!("Dropping temp credential: {}", self.token);
        self.released = true;
        if let Err(e) = self.engine.drop_credential(&self.token).await {
            report.record(RunFailure::Credential(format!(
                "failed to drop temp credential {}: {}",
                self.token,
                RunFailure::reason(&e)
            )));
        }
    }
}

impl<E: DatabaseEngine> Drop for TemporaryCredential<'_, E> {
    fn drop(&mut self) {
        if !self.released {
            error!(
                "Temp credential {} was never released; drop it manually on the server",
                self.token
            );
        }
    }
}
