//! Export collaborator backed by an external program.
//!
//! The browser-driven export flow (navigation, verification challenge, click
//! sequence) lives outside this crate. [`CommandExporter`] invokes it as
//!
//! ```text
//! <program> [args..] <start DD-MM-YYYY> <end DD-MM-YYYY> <output path>
//! ```
//!
//! and then inspects the saved artifact against the row cap.
//!
//! | Program result | Error |
//! |----------------|-------|
//! | still running after `timeout` | `Timeout` (process is killed) |
//! | exit code 75 (`EX_TEMPFAIL`) | `Timeout` |
//! | other non-zero exit | `Fatal` with stderr tail |
//! | exit 0, artifact missing | `Fatal` |
//! | exit 0, rows > limit | `CapacityExceeded` |

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::rows::count_data_rows;
use super::{DownloadError, ExportedFile, Exporter};
use crate::partition::ARTIFACT_EXTENSION;
use crate::range::DateRange;

/// Row cap the portal applies to a single export.
pub const DEFAULT_ROW_LIMIT: u64 = 50_000;

/// Default wall-clock bound for one export.
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(300);

/// Exit code the export program uses to report a UI/network timeout.
pub const EXIT_TEMPFAIL: i32 = 75;

/// Date format the portal's export form expects.
const PORTAL_DATE_FORMAT: &str = "%d-%m-%Y";

/// Longest stderr excerpt carried into a fatal error.
const STDERR_TAIL_CHARS: usize = 512;

/// [`Exporter`] that shells out to an export program.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    program: PathBuf,
    args: Vec<String>,
    output_dir: PathBuf,
    timeout: Duration,
    row_limit: u64,
}

impl CommandExporter {
    /// Creates an exporter running `program`, saving into `output_dir`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output_dir: output_dir.into(),
            timeout: DEFAULT_EXPORT_TIMEOUT,
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Extra arguments placed before the date arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_row_limit(mut self, row_limit: u64) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// Path an export named `output_name` is saved to.
    #[must_use]
    pub fn artifact_path(&self, output_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{output_name}.{ARTIFACT_EXTENSION}"))
    }

    async fn inspect_artifact(&self, path: PathBuf) -> Result<ExportedFile, DownloadError> {
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?
        {
            return Err(DownloadError::fatal(format!(
                "export program reported success but {} was not created",
                path.display()
            )));
        }

        let count_path = path.clone();
        let row_count = tokio::task::spawn_blocking(move || count_data_rows(&count_path))
            .await
            .map_err(|e| DownloadError::fatal(format!("row count task failed: {e}")))??;

        debug!(path = %path.display(), row_count, limit = self.row_limit, "counted export rows");

        if row_count > self.row_limit {
            return Err(DownloadError::capacity_exceeded(
                row_count,
                self.row_limit,
                path,
            ));
        }
        if row_count == 0 {
            warn!(path = %path.display(), "export contains no rows");
        }

        Ok(ExportedFile { path, row_count })
    }
}

#[async_trait]
impl Exporter for CommandExporter {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn download(
        &self,
        range: DateRange,
        output_name: &str,
    ) -> Result<ExportedFile, DownloadError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| DownloadError::io(&self.output_dir, e))?;

        let path = self.artifact_path(output_name);
        remove_stale_artifact(&path).await?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(range.start().format(PORTAL_DATE_FORMAT).to_string())
            .arg(range.end().format(PORTAL_DATE_FORMAT).to_string())
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DownloadError::fatal(format!(
                    "failed to start export program {}: {e}",
                    self.program.display()
                ))
            })?;

        let Ok(output) = tokio::time::timeout(self.timeout, child.wait_with_output()).await else {
            // Dropping the future kills the child.
            return Err(DownloadError::timeout(range, Some(self.timeout)));
        };
        let output = output.map_err(|e| {
            DownloadError::fatal(format!("failed waiting for export program: {e}"))
        })?;

        match output.status.code() {
            Some(0) => {}
            Some(EXIT_TEMPFAIL) => return Err(DownloadError::timeout(range, None)),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DownloadError::fatal(format!(
                    "export program exited with {}: {}",
                    code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    stderr_tail(&stderr)
                )));
            }
        }

        self.inspect_artifact(path).await
    }
}

/// Clears a leftover file from an interrupted attempt so only this run's
/// export can be counted.
async fn remove_stale_artifact(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}

fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    match trimmed.char_indices().rev().nth(STDERR_TAIL_CHARS - 1) {
        Some((index, _)) => &trimmed[index..],
        None => trimmed,
    }
}
