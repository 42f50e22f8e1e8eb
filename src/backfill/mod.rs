//! Month-by-month backfill over a global date range.
//!
//! The driver always downloads whole calendar months: a global range of
//! `2023-01-05..=2023-03-10` processes all of January, February and March.
//! Months run strictly one after another because the export collaborator
//! holds a single automation session.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chrono::NaiveDate;
//! use backfill_core::backfill::BackfillDriver;
//! use backfill_core::download::{AttemptRunner, CommandExporter, RetryPolicy, TokioSleeper};
//! use backfill_core::ledger::BackfillLedger;
//! use backfill_core::partition::PartitionEngine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sleeper = Arc::new(TokioSleeper);
//! let exporter = Arc::new(CommandExporter::new("./export-contracts", "./data"));
//! let runner = AttemptRunner::new(exporter, sleeper.clone(), RetryPolicy::default());
//! let driver = BackfillDriver::new(PartitionEngine::new(runner), sleeper)
//!     .with_month_delay(Duration::from_secs(10));
//!
//! let start = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
//! let end = NaiveDate::from_ymd_opt(2023, 3, 10).unwrap();
//! let report = driver.run(start, end, BackfillLedger::new()).await?;
//! println!("aborted: {:?}", report.aborted);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::download::Sleeper;
use crate::ledger::BackfillLedger;
use crate::partition::{MonthReport, MonthStatus, PartitionEngine};
use crate::range::{DateRange, RangeError, YearMonth, months_overlapping};

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum BackfillError {
    /// The global range is reversed; no work was done.
    #[error(transparent)]
    InvalidRange(#[from] RangeError),
}

/// Why a run stopped before its last month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunAbort {
    /// Month whose attempt failed.
    pub month: YearMonth,
    /// Underlying cause.
    pub cause: String,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct BackfillReport {
    /// Ledger including outcomes from earlier runs and this one.
    pub ledger: BackfillLedger,
    /// One report per month processed, in order.
    pub months: Vec<MonthReport>,
    /// Set when a month-level failure stopped the run.
    pub aborted: Option<RunAbort>,
}

impl BackfillReport {
    /// True when every month was processed, even if some weeks or days failed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.aborted.is_none()
    }

    /// Months whose leaves all succeeded.
    #[must_use]
    pub fn complete_months(&self) -> usize {
        self.months
            .iter()
            .filter(|m| m.status == MonthStatus::Complete)
            .count()
    }

    /// Months that finished with failed or incomplete leaves.
    #[must_use]
    pub fn partial_months(&self) -> usize {
        self.months
            .iter()
            .filter(|m| m.status == MonthStatus::Partial)
            .count()
    }
}

/// Drives the partition engine across consecutive calendar months.
pub struct BackfillDriver {
    engine: PartitionEngine,
    sleeper: Arc<dyn Sleeper>,
    month_delay: Duration,
    ledger_path: Option<PathBuf>,
}

impl std::fmt::Debug for BackfillDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackfillDriver")
            .field("engine", &self.engine)
            .field("month_delay", &self.month_delay)
            .field("ledger_path", &self.ledger_path)
            .finish_non_exhaustive()
    }
}

impl BackfillDriver {
    #[must_use]
    pub fn new(engine: PartitionEngine, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            engine,
            sleeper,
            month_delay: Duration::ZERO,
            ledger_path: None,
        }
    }

    /// Pause between consecutive months, to go easy on the portal.
    #[must_use]
    pub fn with_month_delay(mut self, delay: Duration) -> Self {
        self.month_delay = delay;
        self
    }

    /// Saves the ledger to `path` after every attempted leaf.
    #[must_use]
    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    /// Backfills every calendar month touching `start..=end`.
    ///
    /// `ledger` carries outcomes of earlier runs; leaves it marks successful
    /// are not downloaded again. Week- and day-level failures are logged and
    /// the month continues. A month-level timeout (after retries) or fatal
    /// failure stops the run; months finished before it stay valid.
    ///
    /// # Errors
    ///
    /// Returns [`BackfillError::InvalidRange`] if `start > end`, before any
    /// download is attempted.
    #[instrument(skip(self, ledger), fields(prior_outcomes = ledger.len()))]
    pub async fn run(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        mut ledger: BackfillLedger,
    ) -> Result<BackfillReport, BackfillError> {
        let range = DateRange::new(start, end)?;
        let months = months_overlapping(&range);
        info!(months = months.len(), "starting backfill");

        let mut reports = Vec::with_capacity(months.len());
        let mut aborted = None;

        for (index, month) in months.iter().copied().enumerate() {
            info!(month = %month, "processing month");
            let report = self
                .engine
                .run_month_with_checkpoint(month, &mut ledger, |ledger| self.persist(ledger))
                .await;

            if let MonthStatus::Aborted { cause } = &report.status {
                error!(month = %month, cause = %cause, "month failed, stopping backfill");
                aborted = Some(RunAbort {
                    month,
                    cause: cause.clone(),
                });
                reports.push(report);
                break;
            }
            reports.push(report);

            let is_last = index + 1 == months.len();
            if !is_last && !self.month_delay.is_zero() {
                info!(
                    delay_secs = self.month_delay.as_secs_f64(),
                    "waiting before next month"
                );
                self.sleeper.sleep(self.month_delay).await;
            }
        }

        let summary = ledger.summary();
        info!(
            months = reports.len(),
            succeeded = summary.succeeded,
            incomplete_days = summary.capacity_exceeded,
            failed = summary.transient_failures + summary.fatal_failures,
            aborted = aborted.is_some(),
            "backfill finished"
        );

        Ok(BackfillReport {
            ledger,
            months: reports,
            aborted,
        })
    }

    fn persist(&self, ledger: &BackfillLedger) {
        let Some(path) = &self.ledger_path else {
            return;
        };
        if let Err(e) = ledger.save(path) {
            warn!(error = %e, "failed to save ledger");
        }
    }
}
