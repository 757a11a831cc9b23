// urlbackup/src/backup/metadata.rs
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;

use crate::errors::MetadataError;

/// Timestamp pattern for metadata values. The numeric offset is mandatory so
/// age comparisons never depend on the reader's time zone.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

pub const PERFORMED_BY: &str = "performed-by";
pub const START_TIME: &str = "start-time";
pub const END_TIME: &str = "end-time";
pub const EXECUTED_BY: &str = "executed-by";
pub const DATABASE_NAME: &str = "database-name";

/// Identity written into `performed-by`.
pub fn tool_identity() -> String {
    format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Provenance record attached to an artifact once its backup completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupMetadata {
    pub performed_by: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub executed_by: String,
    pub database_name: String,
}

impl BackupMetadata {
    /// `end_time` is clamped to `start_time` if the clock stepped backwards
    /// during the backup.
    pub fn new(
        performed_by: impl Into<String>,
        start_time: DateTime<FixedOffset>,
        end_time: DateTime<FixedOffset>,
        executed_by: impl Into<String>,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            performed_by: performed_by.into(),
            start_time,
            end_time: end_time.max(start_time),
            executed_by: executed_by.into(),
            database_name: database_name.into(),
        }
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (PERFORMED_BY.to_string(), self.performed_by.clone()),
            (START_TIME.to_string(), format_timestamp(&self.start_time)),
            (END_TIME.to_string(), format_timestamp(&self.end_time)),
            (EXECUTED_BY.to_string(), self.executed_by.clone()),
            (DATABASE_NAME.to_string(), self.database_name.clone()),
        ])
    }
}

pub fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()
}

/// Reads the end time of a backup from its metadata. The artifact name is
/// never consulted.
pub fn parse_backup_end_time(
    metadata: &HashMap<String, String>,
) -> Result<DateTime<FixedOffset>, MetadataError> {
    let value = metadata
        .get(END_TIME)
        .ok_or(MetadataError::Missing(END_TIME))?;

    parse_timestamp(value).ok_or_else(|| MetadataError::Malformed {
        key: END_TIME,
        value: value.clone(),
    })
}

pub fn database_name(metadata: &HashMap<String, String>) -> Option<&str> {
    metadata.get(DATABASE_NAME).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    #[test]
    fn test_metadata_map_has_five_keys() {
        let start = offset(2).with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let end = offset(2).with_ymd_and_hms(2024, 3, 1, 10, 5, 30).unwrap();
        let map = BackupMetadata::new("urlbackup v0.1.0", start, end, "svc_backup", "Sales").to_map();

        assert_eq!(map.len(), 5);
        assert_eq!(map[PERFORMED_BY], "urlbackup v0.1.0");
        assert_eq!(map[START_TIME], "2024-03-01T10:00:00.000000+02:00");
        assert_eq!(map[END_TIME], "2024-03-01T10:05:30.000000+02:00");
        assert_eq!(map[EXECUTED_BY], "svc_backup");
        assert_eq!(map[DATABASE_NAME], "Sales");
    }

    #[test]
    fn test_end_time_round_trips_with_offset() {
        let end = offset(-5)
            .with_ymd_and_hms(2024, 1, 1, 19, 0, 0)
            .unwrap()
            + chrono::Duration::microseconds(123_456);
        let map = BackupMetadata::new("t", end, end, "p", "db").to_map();

        let parsed = parse_backup_end_time(&map).unwrap();
        assert_eq!(parsed, end);
        assert_eq!(parsed.offset(), &offset(-5));
    }

    #[test]
    fn test_end_time_never_precedes_start_time() {
        let start = offset(0).with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let end = offset(0).with_ymd_and_hms(2024, 1, 1, 11, 59, 0).unwrap();
        let metadata = BackupMetadata::new("t", start, end, "p", "db");
        assert_eq!(metadata.end_time, start);
    }

    #[test]
    fn test_missing_end_time() {
        let map = HashMap::from([(DATABASE_NAME.to_string(), "db".to_string())]);
        assert_eq!(
            parse_backup_end_time(&map),
            Err(MetadataError::Missing(END_TIME))
        );
    }

    #[test]
    fn test_malformed_end_time() {
        for value in ["yesterday", "2024-01-01 00:00:00", "2024-01-01T00:00:00.000000"] {
            let map = HashMap::from([(END_TIME.to_string(), value.to_string())]);
            assert!(matches!(
                parse_backup_end_time(&map),
                Err(MetadataError::Malformed { key: END_TIME, .. })
            ));
        }
    }
}
