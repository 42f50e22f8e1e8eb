//! Append-only record of every leaf attempt in a backfill run.
//!
//! The ledger answers "is this range fully covered" and lets a re-run skip
//! leaves that already succeeded. It can be persisted as JSON between runs.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::partition::PartitionNode;
use crate::range::DateRange;

/// Errors from loading or saving a persisted ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger file could not be read or written.
    #[error("ledger IO error at {path}: {source}")]
    Io {
        /// Ledger path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Ledger file holds invalid JSON.
    #[error("ledger at {path} is corrupt: {source}")]
    Json {
        /// Ledger path.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result of attempting one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptResult {
    /// Artifact saved under the row cap.
    Success {
        /// Saved artifact.
        path: PathBuf,
        /// Data rows in the artifact.
        row_count: u64,
    },
    /// Artifact exceeded the row cap; it has been removed from storage.
    CapacityExceeded {
        /// Where the oversized artifact had been saved.
        path: PathBuf,
        /// Data rows counted.
        row_count: u64,
        /// Row cap in force.
        limit: u64,
    },
    /// Every try timed out.
    TransientFailure {
        /// Retries spent after the first try.
        retries_used: u32,
    },
    /// Unclassified failure.
    FatalFailure {
        /// Human-readable cause.
        cause: String,
    },
}

impl AttemptResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Transient or fatal failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::TransientFailure { .. } | Self::FatalFailure { .. })
    }

    /// Short description used in logs and abort reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Success { row_count, .. } => format!("success ({row_count} rows)"),
            Self::CapacityExceeded {
                row_count, limit, ..
            } => format!("row cap exceeded ({row_count} > {limit})"),
            Self::TransientFailure { retries_used } => {
                format!("timed out after {retries_used} retries")
            }
            Self::FatalFailure { cause } => cause.clone(),
        }
    }
}

/// Outcome of one leaf that was actually attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub node: PartitionNode,
    pub range: DateRange,
    pub result: AttemptResult,
}

/// Counts of outcomes by result kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub succeeded: usize,
    pub capacity_exceeded: usize,
    pub transient_failures: usize,
    pub fatal_failures: usize,
}

impl LedgerSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.capacity_exceeded + self.transient_failures + self.fatal_failures
    }
}

/// Ordered, append-only sequence of attempt outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillLedger {
    outcomes: Vec<AttemptOutcome>,
}

impl BackfillLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an outcome.
    pub fn record(&mut self, outcome: AttemptOutcome) {
        self.outcomes.push(outcome);
    }

    /// Appends several outcomes, preserving order.
    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = AttemptOutcome>) {
        self.outcomes.extend(outcomes);
    }

    /// All outcomes in the order they were recorded.
    #[must_use]
    pub fn outcomes(&self) -> &[AttemptOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Most recent outcome for an identical node and range.
    #[must_use]
    pub fn latest_for(&self, node: &PartitionNode, range: &DateRange) -> Option<&AttemptOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|outcome| outcome.node == *node && outcome.range == *range)
    }

    /// Returns true if `node` over `range` has already been downloaded successfully.
    #[must_use]
    pub fn has_success(&self, node: &PartitionNode, range: &DateRange) -> bool {
        self.outcomes.iter().any(|outcome| {
            outcome.node == *node && outcome.range == *range && outcome.result.is_success()
        })
    }

    /// Returns true if any outcome was recorded for a node below `node`,
    /// meaning `node` was split in an earlier run.
    #[must_use]
    pub fn has_descendant_outcomes(&self, node: &PartitionNode) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| node.is_ancestor_of(&outcome.node))
    }

    /// Returns true if every day of `range` lies inside a successful leaf.
    #[must_use]
    pub fn is_covered(&self, range: &DateRange) -> bool {
        range.iter_days().all(|day| self.is_day_covered(day))
    }

    fn is_day_covered(&self, day: NaiveDate) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| outcome.result.is_success() && outcome.range.contains(day))
    }

    /// Day leaves that still hit the row cap, so their data is incomplete.
    #[must_use]
    pub fn incomplete_days(&self) -> Vec<&AttemptOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.node.is_terminal() && outcome.result.is_capacity_exceeded())
            .collect()
    }

    /// Counts outcomes by result kind.
    #[must_use]
    pub fn summary(&self) -> LedgerSummary {
        self.outcomes
            .iter()
            .fold(LedgerSummary::default(), |mut summary, outcome| {
                match outcome.result {
                    AttemptResult::Success { .. } => summary.succeeded += 1,
                    AttemptResult::CapacityExceeded { .. } => summary.capacity_exceeded += 1,
                    AttemptResult::TransientFailure { .. } => summary.transient_failures += 1,
                    AttemptResult::FatalFailure { .. } => summary.fatal_failures += 1,
                }
                summary
            })
    }

    /// Loads a ledger from `path`, or returns an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ledger on disk, starting fresh");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let ledger: Self = serde_json::from_str(&raw).map_err(|source| LedgerError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), outcomes = ledger.len(), "loaded ledger");
        Ok(ledger)
    }

    /// Writes the ledger to `path` as pretty JSON, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on serialization or IO failure.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(self).map_err(|source| LedgerError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp_path, path).map_err(io_err)?;

        debug!(path = %path.display(), outcomes = self.len(), "saved ledger");
        Ok(())
    }
}
