// urlbackup/src/backup/naming.rs
use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y%m%d";
pub const TIME_FORMAT: &str = "%H%M%S";

/// The kind of backup issued to the engine. The textual form is part of the
/// artifact name, so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupKind {
    Full,
    Differential,
    Log,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::Differential => "Differential",
            Self::Log => "Log",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "differential" => Ok(Self::Differential),
            "log" => Ok(Self::Log),
            _ => Err(format!(
                "Backup type can be either {}, {} or {}. {} is not supported.",
                Self::Full,
                Self::Differential,
                Self::Log,
                s
            )),
        }
    }
}

/// Canonical name of a stored backup: `<yyyyMMdd>_<HHmmss>_<database>.<kind>`.
///
/// Names of the same database sort chronologically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn format(timestamp: &NaiveDateTime, database: &str, kind: BackupKind) -> Self {
        Self(format!(
            "{}_{}_{}.{}",
            timestamp.format(DATE_FORMAT),
            timestamp.format(TIME_FORMAT),
            database,
            kind
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tokens recovered from an artifact name. Only used for diagnostics; the
/// retention sweep reads metadata, never the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifactName {
    pub taken_at: NaiveDateTime,
    pub database: String,
    pub kind: BackupKind,
}

pub fn parse_artifact_name(name: &str) -> Option<ParsedArtifactName> {
    let (date, rest) = name.split_at_checked(8)?;
    let rest = rest.strip_prefix('_')?;
    let (time, rest) = rest.split_at_checked(6)?;
    let rest = rest.strip_prefix('_')?;
    let (database, kind) = rest.rsplit_once('.')?;

    if database.is_empty()
        || !date.bytes().all(|b| b.is_ascii_digit())
        || !time.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let taken_at = NaiveDateTime::parse_from_str(
        &format!("{date}{time}"),
        &format!("{DATE_FORMAT}{TIME_FORMAT}"),
    )
    .ok()?;

    Some(ParsedArtifactName {
        taken_at,
        database: database.to_string(),
        kind: kind.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .unwrap()
    }

    #[test]
    fn test_format_pads_date_and_time() {
        let name = ArtifactName::format(&at(2024, 1, 5, 3, 4, 9), "Sales", BackupKind::Full);
        assert_eq!(name.as_str(), "20240105_030409_Sales.Full");
    }

    #[test]
    fn test_format_is_deterministic() {
        let ts = at(2023, 12, 31, 23, 59, 59);
        assert_eq!(
            ArtifactName::format(&ts, "HR", BackupKind::Log),
            ArtifactName::format(&ts, "HR", BackupKind::Log)
        );
    }

    #[test]
    fn test_names_sort_chronologically() {
        let older = ArtifactName::format(&at(2023, 12, 31, 23, 59, 59), "HR", BackupKind::Log);
        let newer = ArtifactName::format(&at(2024, 1, 1, 0, 0, 0), "HR", BackupKind::Log);
        assert!(older < newer);
    }

    #[test]
    fn test_parse_recovers_tokens() {
        let ts = at(2024, 2, 29, 12, 30, 0);
        for kind in [BackupKind::Full, BackupKind::Differential, BackupKind::Log] {
            for database in ["master", "Sales_Archive", "db.with.dots"] {
                let name = ArtifactName::format(&ts, database, kind);
                let parsed = parse_artifact_name(name.as_str()).unwrap();
                assert_eq!(parsed.database, database);
                assert_eq!(parsed.kind, kind);
                assert_eq!(parsed.taken_at, ts);
            }
        }
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert_eq!(parse_artifact_name("readme.txt"), None);
        assert_eq!(parse_artifact_name("2024010_120000_x.Full"), None);
        assert_eq!(parse_artifact_name("20241301_120000_x.Full"), None);
        assert_eq!(parse_artifact_name("20240101_120000_.Full"), None);
        assert_eq!(parse_artifact_name("20240101_120000_x.Snapshot"), None);
        assert_eq!(parse_artifact_name("20240101_12000a_x.Full"), None);
    }

    #[test]
    fn test_backup_kind_parse_is_case_insensitive() {
        assert_eq!("log".parse::<BackupKind>(), Ok(BackupKind::Log));
        assert_eq!("FULL".parse::<BackupKind>(), Ok(BackupKind::Full));
        assert_eq!(" Differential ".parse::<BackupKind>(), Ok(BackupKind::Differential));
        assert!("Copy".parse::<BackupKind>().is_err());
    }
}
