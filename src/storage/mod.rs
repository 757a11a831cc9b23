// urlbackup/src/storage/mod.rs
pub(crate) mod s3;

use anyhow::Result;
use std::collections::HashMap;

use crate::backup::naming::ArtifactName;

pub use s3::S3ObjectStore;

/// The container the engine writes backups into. Artifact names are relative
/// to the container (any folder prefix is handled by the implementation).
pub trait ObjectStore {
    /// Creates the container when it does not exist yet.
    async fn ensure_container(&self) -> Result<()>;

    /// URL the engine writes the artifact to.
    fn destination_url(&self, artifact: &ArtifactName) -> String;

    /// URL prefix shared by every destination URL. The engine credential is
    /// named after it.
    fn credential_scope(&self) -> String;

    async fn put_metadata(&self, artifact: &str, metadata: HashMap<String, String>) -> Result<()>;

    async fn list_artifacts(&self) -> Result<Vec<String>>;

    /// `None` when the artifact carries no metadata.
    async fn fetch_metadata(&self, artifact: &str) -> Result<Option<HashMap<String, String>>>;

    async fn delete(&self, artifact: &str) -> Result<()>;
}
