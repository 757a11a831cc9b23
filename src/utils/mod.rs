pub mod logging;

use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

/// Finds the sqlcmd executable in the system PATH.
pub fn find_sqlcmd_executable() -> Result<PathBuf> {
    which("sqlcmd").context("sqlcmd executable not found in PATH. Please ensure the SQL Server command line tools are installed and in your PATH.")
}
