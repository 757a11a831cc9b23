// urlbackup/src/config/mod.rs
mod cli;

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use url::Url;

use crate::backup::naming::BackupKind;
use crate::backup::selection::NameFilter;
use crate::errors::ConfigError;
use crate::rotation::{Retention, RetentionPolicy};

pub use cli::Cli;

pub const DEFAULT_REGION: &str = "us-east-1";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub backup_type: Option<String>,
    pub data_source: Option<String>,
    pub integrated: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub retention_days: Option<i64>,
    pub name_filter: Option<String>,
    pub include_read_only: Option<bool>,
    pub s3_storage: Option<JsonS3StorageConfig>,
}

impl RawJsonConfig {
    pub fn load_from_json(config_path: &Path) -> anyhow::Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Authentication {
    Integrated,
    SqlLogin { username: String, password: String },
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrated => f.write_str("Integrated"),
            Self::SqlLogin { username, .. } => f
                .debug_struct("SqlLogin")
                .field("username", username)
                .field("password", &"xxxx")
                .finish(),
        }
    }
}

/// Where backups are written. `account` and `secret` double as the identity
/// of the temporary credential handed to the engine.
#[derive(Clone)]
pub struct StorageConfig {
    pub endpoint_url: Option<String>,
    pub region: String,
    pub account: String,
    pub secret: String,
    pub container: String,
    pub folder_prefix: Option<String>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("account", &self.account)
            .field("secret", &"xxxx")
            .field("container", &self.container)
            .field("folder_prefix", &self.folder_prefix)
            .finish()
    }
}

/// Everything one run needs, validated up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub backup_kind: BackupKind,
    pub data_source: String,
    pub authentication: Authentication,
    pub storage: StorageConfig,
    pub retention: Retention,
    pub name_filter: Option<NameFilter>,
    pub include_read_only: bool,
}

impl RunConfig {
    /// Builds the run configuration from the command line, reading the JSON
    /// file named by `--config` first when present.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let raw = match &cli.config {
            Some(path) => RawJsonConfig::load_from_json(path)?,
            None => RawJsonConfig::default(),
        };
        Self::from_sources(cli, raw)
    }

    fn from_sources(cli: &Cli, raw: RawJsonConfig) -> Result<Self, ConfigError> {
        let s3 = raw.s3_storage.clone().unwrap_or_default();

        let backup_kind = cli
            .backup_type
            .clone()
            .or(raw.backup_type)
            .ok_or(ConfigError::MissingBackupType)?
            .parse::<BackupKind>()
            .map_err(ConfigError::InvalidBackupType)?;

        let data_source = non_empty(cli.data_source.clone())
            .or(non_empty(raw.data_source))
            .ok_or(ConfigError::MissingDataSource)?;

        let authentication = match cli.user.as_deref() {
            _ if cli.integrated => Authentication::Integrated,
            Some([username, password]) => Authentication::SqlLogin {
                username: username.clone(),
                password: password.clone(),
            },
            _ => match (raw.integrated, non_empty(raw.username), raw.password) {
                (Some(true), _, _) => Authentication::Integrated,
                (_, Some(username), Some(password)) => Authentication::SqlLogin { username, password },
                _ => return Err(ConfigError::MissingAuthentication),
            },
        };

        let (account, secret, container) = match cli.storage.as_deref() {
            Some([account, secret, container]) => {
                (Some(account.clone()), Some(secret.clone()), Some(container.clone()))
            }
            _ => (s3.access_key_id, s3.secret_access_key, s3.bucket_name),
        };
        let (Some(account), Some(secret), Some(container)) =
            (non_empty(account), non_empty(secret), non_empty(container))
        else {
            return Err(ConfigError::MissingStorage);
        };

        let endpoint_url = non_empty(cli.endpoint.clone()).or(non_empty(s3.endpoint_url));
        if let Some(endpoint) = &endpoint_url {
            Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                source,
            })?;
        }

        let retention = cli
            .retention
            .or(raw.retention_days)
            .ok_or(ConfigError::MissingRetention)?;
        let retention = Retention::from_days(retention)?;

        let name_filter = match non_empty(cli.filter.clone()).or(non_empty(raw.name_filter)) {
            Some(pattern) => Some(
                NameFilter::new(&pattern)
                    .map_err(|source| ConfigError::InvalidFilter { pattern, source })?,
            ),
            None => None,
        };

        Ok(RunConfig {
            backup_kind,
            data_source,
            authentication,
            storage: StorageConfig {
                endpoint_url,
                region: non_empty(cli.region.clone())
                    .or(non_empty(s3.region))
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                account,
                secret,
                container,
                folder_prefix: non_empty(cli.prefix.clone()).or(non_empty(s3.folder_prefix)),
            },
            retention,
            name_filter,
            include_read_only: cli.include_read_only || raw.include_read_only.unwrap_or(false),
        })
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            retention: self.retention,
            name_filter: self.name_filter.clone(),
        }
    }

    /// Principal recorded in the `executed-by` metadata key.
    pub fn principal(&self) -> String {
        match &self.authentication {
            Authentication::SqlLogin { username, .. } => username.clone(),
            Authentication::Integrated => env::var("USERNAME")
                .or_else(|_| env::var("USER"))
                .unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
