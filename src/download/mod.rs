//! Export collaborator contract and the retry wrapper around it.
//!
//! The backfill core never drives the portal itself. It depends on an
//! [`Exporter`] that turns one date range into one saved CSV artifact, or
//! reports a timeout, a row-cap overflow, or a fatal failure.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use backfill_core::download::{AttemptRunner, CommandExporter, RetryPolicy, TokioSleeper};
//! use backfill_core::partition::PartitionNode;
//! use backfill_core::range::YearMonth;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = Arc::new(CommandExporter::new("./export-contracts", "./data"));
//! let runner = AttemptRunner::new(exporter, Arc::new(TokioSleeper), RetryPolicy::default());
//! let april = YearMonth::new(2023, 4)?;
//! let outcome = runner.attempt(PartitionNode::month(april), april.bounds()).await;
//! println!("{}", outcome.result.describe());
//! # Ok(())
//! # }
//! ```

mod command;
mod error;
pub mod pacer;
mod retry;
pub mod rows;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::range::DateRange;

pub use command::{CommandExporter, DEFAULT_EXPORT_TIMEOUT, DEFAULT_ROW_LIMIT, EXIT_TEMPFAIL};
pub use error::DownloadError;
pub use pacer::{Sleeper, TokioSleeper};
pub use retry::{
    AttemptRunner, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, FailureType, RetryDecision,
    RetryPolicy, classify_error,
};

/// A saved export that stayed under the row cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Where the artifact was saved.
    pub path: PathBuf,
    /// Data rows in the artifact.
    pub row_count: u64,
}

/// The export collaborator.
///
/// Implementations own the automation session; the core calls them strictly
/// one request at a time.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Exports `range` to an artifact named after `output_name`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Timeout`] when the portal did not respond in time
    /// - [`DownloadError::CapacityExceeded`] when the saved artifact exceeds
    ///   the row cap; the caller deletes it
    /// - [`DownloadError::Fatal`] / [`DownloadError::Io`] otherwise
    async fn download(
        &self,
        range: DateRange,
        output_name: &str,
    ) -> Result<ExportedFile, DownloadError>;
}

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
