//! Metadata-driven retention of stored backups.
pub(crate) mod policy;

pub use policy::{
    ArtifactListing, Retention, RetentionPolicy, SkipReason, Verdict, artifact_age, should_delete,
};
