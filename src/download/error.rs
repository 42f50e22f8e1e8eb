//! Error types reported by export collaborators.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::range::DateRange;

/// Errors an [`Exporter`](super::Exporter) can report for one export request.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The portal or automation session did not respond within its bounded wait.
    #[error("timeout exporting {range} after {waited:?}")]
    Timeout {
        /// Range that was being exported.
        range: DateRange,
        /// How long the collaborator waited before giving up, if known.
        waited: Option<Duration>,
    },

    /// The export was saved but holds more rows than the portal allows, so it
    /// is presumed truncated.
    #[error("export {path} has {row_count} rows (limit is {limit})")]
    CapacityExceeded {
        /// Data rows counted in the saved artifact.
        row_count: u64,
        /// Row cap the portal enforces.
        limit: u64,
        /// Where the oversized artifact was saved.
        path: PathBuf,
    },

    /// Unexpected condition, e.g. the verification challenge could not be solved.
    #[error("export failed: {cause}")]
    Fatal {
        /// Human-readable cause.
        cause: String,
    },

    /// Local file system error while preparing or inspecting an artifact.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates a timeout error.
    pub fn timeout(range: DateRange, waited: Option<Duration>) -> Self {
        Self::Timeout { range, waited }
    }

    /// Creates a capacity error for an oversized artifact.
    pub fn capacity_exceeded(row_count: u64, limit: u64, path: impl Into<PathBuf>) -> Self {
        Self::CapacityExceeded {
            row_count,
            limit,
            path: path.into(),
        }
    }

    /// Creates an unclassified fatal error.
    pub fn fatal(cause: impl Into<String>) -> Self {
        Self::Fatal {
            cause: cause.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_timeout_display_names_range() {
        let day = NaiveDate::from_ymd_opt(2023, 4, 5).unwrap();
        let error = DownloadError::timeout(DateRange::single_day(day), None);
        assert!(error.to_string().contains("2023-04-05..=2023-04-05"));
    }

    #[test]
    fn test_capacity_display_includes_counts() {
        let error = DownloadError::capacity_exceeded(50_001, 50_000, "/data/contracts_2023-04.csv");
        let msg = error.to_string();
        assert!(msg.contains("50001"));
        assert!(msg.contains("50000"));
        assert!(msg.contains("contracts_2023-04.csv"));
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = DownloadError::io("/data", io);
        assert!(error.source().is_some());
    }
}
