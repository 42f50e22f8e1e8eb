//! Contracts Backfill Core Library
//!
//! Extracts procurement contract exports for arbitrary date ranges from a
//! portal that caps the number of rows per export. A range is downloaded one
//! calendar month at a time; a month that overflows the cap is split into
//! weeks, and an overflowing week into days.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`range`] - Month, week and day boundary arithmetic
//! - [`partition`] - Partition nodes, artifact naming and the splitting engine
//! - [`download`] - Export collaborator contract and bounded retry
//! - [`ledger`] - Record of attempted leaves, used for resume
//! - [`backfill`] - Month-by-month driver over a global range

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backfill;
pub mod download;
pub mod ledger;
pub mod partition;
pub mod range;

// Re-export commonly used types
pub use backfill::{BackfillDriver, BackfillError, BackfillReport, RunAbort};
pub use download::{
    AttemptRunner, CommandExporter, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DownloadError,
    ExportedFile, Exporter, FailureType, RetryPolicy, Sleeper, TokioSleeper,
};
pub use ledger::{AttemptOutcome, AttemptResult, BackfillLedger};
pub use partition::{MonthReport, MonthStatus, NodeLevel, PartitionEngine, PartitionNode};
pub use range::{DateRange, YearMonth};
