// urlbackup/src/engine/sqlcmd.rs
use anyhow::{Context, Result, anyhow, bail};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{DatabaseEngine, DiagnosticSink};
use crate::backup::naming::BackupKind;
use crate::backup::selection::{DatabaseDescriptor, RecoveryModel};
use crate::config::Authentication;
use crate::utils::find_sqlcmd_executable;

/// Upper bound for one statement. Full backups of large databases can take
/// a long time.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 48);

const LIST_DATABASES: &str = include_str!("tsql/list_databases.sql");
const CREATE_CREDENTIAL: &str = include_str!("tsql/create_credential.sql");
const DROP_CREDENTIAL: &str = include_str!("tsql/drop_credential.sql");
const BACKUP_FULL: &str = include_str!("tsql/backup_full.sql");
const BACKUP_DIFFERENTIAL: &str = include_str!("tsql/backup_differential.sql");
const BACKUP_LOG: &str = include_str!("tsql/backup_log.sql");

/// SQL Server reached through the `sqlcmd` client.
pub struct SqlcmdEngine<D> {
    sqlcmd: PathBuf,
    data_source: String,
    authentication: Authentication,
    sink: D,
}

impl<D: DiagnosticSink> SqlcmdEngine<D> {
    pub fn new(data_source: &str, authentication: Authentication, sink: D) -> Result<Self> {
        let sqlcmd = find_sqlcmd_executable()?;
        debug!("Found sqlcmd executable at: {}", sqlcmd.display());

        Ok(Self {
            sqlcmd,
            data_source: data_source.to_string(),
            authentication,
            sink,
        })
    }

    /// The statement is read from `script` with `-i`, so secrets it carries
    /// never show up in the process arguments.
    fn command(&self, script: &Path) -> Command {
        let mut command = Command::new(&self.sqlcmd);
        command
            .arg("-S")
            .arg(&self.data_source)
            .arg("-b") // Exit with an error code when a statement fails
            .arg("-r")
            .arg("1") // Error messages go to stderr
            .arg("-i")
            .arg(script);

        match &self.authentication {
            Authentication::Integrated => {
                command.arg("-E");
            }
            Authentication::SqlLogin { username, password } => {
                command.arg("-U").arg(username).env("SQLCMDPASSWORD", password);
            }
        }

        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    /// Runs one statement and returns its stdout. `label` is logged instead
    /// of the statement, which may carry secrets.
    async fn execute(&self, label: &str, statement: &str, extra_args: &[&str]) -> Result<String> {
        debug!("Sending statement: {}", label);

        let script = write_script(statement)?;
        let mut command = self.command(script.path());
        command.args(extra_args);

        let output = timeout(COMMAND_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                anyhow!(
                    "sqlcmd ({}) timed out after {} seconds",
                    label,
                    COMMAND_TIMEOUT.as_secs()
                )
            })?
            .with_context(|| format!("Failed to execute sqlcmd ({label})"))?;

        if !output.status.success() {
            bail!(
                "sqlcmd ({}) against {} failed with status: {}\nStdout: {}\nStderr: {}",
                label,
                self.data_source,
                output.status,
                String::from_utf8_lossy(&output.stdout).trim(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn send_non_query(&self, label: &str, statement: &str) -> Result<()> {
        let stdout = self.execute(label, statement, &[]).await?;
        for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.sink.message(line);
        }
        Ok(())
    }
}

impl<D: DiagnosticSink> DatabaseEngine for SqlcmdEngine<D> {
    async fn list_databases(&self) -> Result<Vec<DatabaseDescriptor>> {
        let stdout = self
            .execute("list databases", LIST_DATABASES, &["-h", "-1", "-W", "-s", "|"])
            .await?;
        let databases =
            parse_catalog_output(&stdout).context("Failed to read the database list")?;
        debug!(
            "Found databases: {:?}",
            databases.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
        );
        Ok(databases)
    }

    async fn create_credential(&self, name: &str, access_key_id: &str, secret: &str) -> Result<()> {
        let statement = create_credential_statement(name, access_key_id, secret);
        self.send_non_query("create credential", &statement)
            .await
            .with_context(|| format!("Failed to create credential {name}"))
    }

    async fn drop_credential(&self, name: &str) -> Result<()> {
        let statement = drop_credential_statement(name);
        self.send_non_query("drop credential", &statement)
            .await
            .with_context(|| format!("Failed to drop credential {name}"))
    }

    async fn backup_to_url(
        &self,
        database: &str,
        kind: BackupKind,
        url: &str,
        credential: &str,
    ) -> Result<()> {
        // The server picks the credential whose name is a prefix of the URL.
        debug!("Backing up {} to {} with credential {}", database, url, credential);
        let statement = backup_statement(database, kind, url);
        self.send_non_query(&format!("{kind} backup of {database}"), &statement)
            .await
            .with_context(|| format!("Failed to back up {database} to {url}"))
    }
}

/// S3 credentials carry the fixed identity `S3 Access Key` and the secret
/// `<access key id>:<secret access key>`. A leftover credential of the same
/// name is replaced.
pub(crate) fn create_credential_statement(name: &str, access_key_id: &str, secret: &str) -> String {
    render(
        CREATE_CREDENTIAL,
        &[
            ("credential", quote_identifier(name).as_str()),
            ("credential_name", quote_literal(name).as_str()),
            ("secret", quote_literal(&format!("{access_key_id}:{secret}")).as_str()),
        ],
    )
}

pub(crate) fn drop_credential_statement(name: &str) -> String {
    render(
        DROP_CREDENTIAL,
        &[
            ("credential", quote_identifier(name).as_str()),
            ("credential_name", quote_literal(name).as_str()),
        ],
    )
}

pub(crate) fn backup_statement(database: &str, kind: BackupKind, url: &str) -> String {
    let template = match kind {
        BackupKind::Full => BACKUP_FULL,
        BackupKind::Differential => BACKUP_DIFFERENTIAL,
        BackupKind::Log => BACKUP_LOG,
    };
    render(
        template,
        &[
            ("database", quote_identifier(database).as_str()),
            ("url", quote_literal(url).as_str()),
        ],
    )
}

fn write_script(statement: &str) -> Result<NamedTempFile> {
    let mut script = tempfile::Builder::new()
        .prefix("urlbackup-")
        .suffix(".sql")
        .tempfile()
        .context("Failed to create sqlcmd script file")?;
    script
        .write_all(statement.as_bytes())
        .and_then(|_| script.flush())
        .context("Failed to write sqlcmd script file")?;
    Ok(script)
}

/// `[name]` with `]` doubled.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// `N'value'` with `'` doubled.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Substitutes `{key}` placeholders in one pass, so substituted values are
/// never scanned again. Unknown placeholders are left untouched.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        rest = &rest[start..];

        let key = rest.find('}').map(|end| &rest[1..end]);
        match key.and_then(|key| values.iter().find(|(k, _)| *k == key)) {
            Some((key, value)) => {
                rendered.push_str(value);
                rest = &rest[key.len() + 2..];
            }
            None => {
                rendered.push('{');
                rest = &rest[1..];
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

/// Parses `name|is_read_only|recovery_model_desc` rows as printed by
/// `sqlcmd -h -1 -W -s "|"`. The name is taken from the left so it may
/// itself contain `|`.
pub(crate) fn parse_catalog_output(stdout: &str) -> Result<Vec<DatabaseDescriptor>> {
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.rsplitn(3, '|');
            let (Some(recovery_model), Some(read_only), Some(name)) =
                (fields.next(), fields.next(), fields.next())
            else {
                bail!("Unexpected catalog row: {line}");
            };

            let is_read_only = match read_only.trim() {
                "1" => true,
                "0" => false,
                other => bail!("Unexpected is_read_only value '{other}' for database {name}"),
            };

            Ok(DatabaseDescriptor {
                name: name.to_string(),
                is_read_only,
                recovery_model: RecoveryModel::from_catalog(recovery_model),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_output() -> anyhow::Result<()> {
        let stdout = "master|0|SIMPLE\nSales|0|FULL\n\nArchive|1|BULK_LOGGED\nodd|name|1|FULL\n";
        let databases = parse_catalog_output(stdout)?;

        assert_eq!(databases.len(), 4);
        assert_eq!(databases[0].name, "master");
        assert_eq!(databases[0].recovery_model, RecoveryModel::Simple);
        assert!(!databases[1].is_read_only);
        assert_eq!(databases[1].recovery_model, RecoveryModel::Full);
        assert!(databases[2].is_read_only);
        assert_eq!(databases[2].recovery_model, RecoveryModel::BulkLogged);
        assert_eq!(databases[3].name, "odd|name");
        Ok(())
    }

    #[test]
    fn test_parse_catalog_output_rejects_garbage() {
        assert!(parse_catalog_output("Msg 18456, Level 14, State 1").is_err());
        assert!(parse_catalog_output("Sales|yes|FULL").is_err());
        assert!(parse_catalog_output("").map(|d| d.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_identifier("Sales"), "[Sales]");
        assert_eq!(quote_identifier("we]ird"), "[we]]ird]");
        assert_eq!(quote_literal("O'Brien"), "N'O''Brien'");
    }

    #[test]
    fn test_render_is_single_pass() {
        let rendered = render(
            "{a} and {b} and {unknown}",
            &[("a", "{b}"), ("b", "B")],
        );
        assert_eq!(rendered, "{b} and B and {unknown}");
    }

    #[test]
    fn test_backup_statements_per_kind() {
        let url = "s3://s3.us-east-1.amazonaws.com/backups/20240101_000000_Sales.Full";

        let full = backup_statement("Sales", BackupKind::Full, url);
        assert!(full.starts_with("BACKUP DATABASE [Sales]"));
        assert!(full.contains(&format!("TO URL = N'{url}'")));
        assert!(!full.contains("DIFFERENTIAL"));

        let diff = backup_statement("Sales", BackupKind::Differential, url);
        assert!(diff.starts_with("BACKUP DATABASE [Sales]"));
        assert!(diff.contains("WITH DIFFERENTIAL"));

        let log = backup_statement("Sales", BackupKind::Log, url);
        assert!(log.starts_with("BACKUP LOG [Sales]"));

        // S3 credentials are matched by URL prefix, never named in the statement.
        for statement in [full, diff, log] {
            assert!(!statement.contains("CREDENTIAL"));
        }
    }

    #[test]
    fn test_credential_statements() {
        let name = "s3://minio.local:9000/backups/prod";
        let create = create_credential_statement(name, "AKIA", "se'cret");
        assert!(create.contains("CREATE CREDENTIAL [s3://minio.local:9000/backups/prod]"));
        assert!(create.contains("IDENTITY = N'S3 Access Key'"));
        assert!(create.contains("SECRET = N'AKIA:se''cret'"));
        assert!(create.contains(&format!("WHERE name = N'{name}'")));

        let drop = drop_credential_statement(name);
        assert!(drop.contains(&format!("WHERE name = N'{name}'")));
        assert!(drop.contains(&format!("DROP CREDENTIAL [{name}]")));
    }

    #[test]
    fn test_statement_is_passed_through_a_script_file() -> anyhow::Result<()> {
        let engine = SqlcmdEngine {
            sqlcmd: PathBuf::from("sqlcmd"),
            data_source: "sql01".to_string(),
            authentication: Authentication::SqlLogin {
                username: "svc_backup".to_string(),
                password: "hunter2".to_string(),
            },
            sink: crate::engine::TracingSink,
        };

        let statement = create_credential_statement("s3://host/backups", "AKIA", "s3cr3t");
        let script = write_script(&statement)?;
        let command = engine.command(script.path());

        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.iter().all(|a| !a.contains("s3cr3t") && !a.contains("hunter2")));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == script.path().to_string_lossy()));
        assert_eq!(std::fs::read_to_string(script.path())?, statement);
        Ok(())
    }
}
