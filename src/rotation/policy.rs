// urlbackup/src/rotation/policy.rs
use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::backup::metadata::{database_name, parse_backup_end_time};
use crate::backup::selection::NameFilter;
use crate::errors::{ConfigError, MetadataError};

/// Retention window. `-1` on the command line disables deletion entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Disabled,
    Days(u32),
}

impl Retention {
    pub fn from_days(days: i64) -> Result<Self, ConfigError> {
        match days {
            -1 => Ok(Self::Disabled),
            _ => u32::try_from(days)
                .map(Self::Days)
                .map_err(|_| ConfigError::InvalidRetention(days)),
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("-1"),
            Self::Days(days) => write!(f, "{days}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub retention: Retention,
    pub name_filter: Option<NameFilter>,
}

/// An existing blob as seen by the sweep. `metadata` is `None` when the blob
/// carries no metadata at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactListing {
    pub name: String,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMetadata,
    NoDatabaseName,
    FilteredOut,
    NoEndTime,
    MalformedTimestamp,
    MetadataUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoMetadata => "no metadata",
            Self::NoDatabaseName => "no database-name key",
            Self::FilteredOut => "filtered out",
            Self::NoEndTime => "no end-time key",
            Self::MalformedTimestamp => "malformed timestamp",
            Self::MetadataUnavailable => "metadata unavailable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Delete,
    Skip(SkipReason),
}

/// Time elapsed since `end_time`. Timestamps in the future count as zero.
pub fn artifact_age(end_time: DateTime<FixedOffset>, now: DateTime<Utc>) -> Duration {
    let age = now.signed_duration_since(end_time);
    if age < Duration::zero() {
        Duration::zero()
    } else {
        age
    }
}

/// Decides what happens to one existing artifact. Blobs that cannot be
/// evaluated are skipped, never deleted.
pub fn should_delete(
    artifact: &ArtifactListing,
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> Verdict {
    let days = match policy.retention {
        Retention::Disabled => return Verdict::Keep,
        Retention::Days(days) => days,
    };

    let metadata = match &artifact.metadata {
        Some(metadata) if !metadata.is_empty() => metadata,
        _ => return Verdict::Skip(SkipReason::NoMetadata),
    };

    let Some(database) = database_name(metadata) else {
        return Verdict::Skip(SkipReason::NoDatabaseName);
    };

    if let Some(filter) = &policy.name_filter {
        if !filter.is_match(database) {
            return Verdict::Skip(SkipReason::FilteredOut);
        }
    }

    let end_time = match parse_backup_end_time(metadata) {
        Ok(end_time) => end_time,
        Err(MetadataError::Missing(_)) => return Verdict::Skip(SkipReason::NoEndTime),
        Err(MetadataError::Malformed { .. }) => {
            return Verdict::Skip(SkipReason::MalformedTimestamp);
        }
    };

    if artifact_age(end_time, now) > Duration::days(i64::from(days)) {
        Verdict::Delete
    } else {
        Verdict::Keep
    }
}
