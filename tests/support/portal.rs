//! A simulated contracts portal and a sleeper that records instead of waiting.
//!
//! The portal writes real `;`-delimited CSV files into a directory, one row per
//! contract, so size checks and artifact cleanup can be observed on disk.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use backfill_core::BackfillLedger;
use backfill_core::download::{DownloadError, ExportedFile, Exporter, Sleeper};
use backfill_core::range::DateRange;
use chrono::NaiveDate;

/// A failure the portal returns for one request before behaving normally.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum ScriptedFailure {
    Timeout,
    Fatal(String),
}

/// Portal that publishes a fixed number of contracts per day.
pub struct SimulatedPortal {
    dir: PathBuf,
    row_limit: u64,
    rows_per_day: u64,
    day_rows: HashMap<NaiveDate, u64>,
    failures: Mutex<HashMap<String, VecDeque<ScriptedFailure>>>,
    calls: Mutex<Vec<String>>,
    watched_ledger: Option<PathBuf>,
    saved_outcomes: Mutex<Vec<usize>>,
}

#[allow(dead_code)]
impl SimulatedPortal {
    pub fn new(dir: &Path, row_limit: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            row_limit,
            rows_per_day: 1,
            day_rows: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            watched_ledger: None,
            saved_outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rows_per_day(mut self, rows: u64) -> Self {
        self.rows_per_day = rows;
        self
    }

    pub fn with_day_rows(mut self, day: NaiveDate, rows: u64) -> Self {
        self.day_rows.insert(day, rows);
        self
    }

    /// Queues `count` copies of `failure` for requests named `output_name`.
    pub fn fail(self, output_name: &str, failure: ScriptedFailure, count: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(output_name.to_string())
            .or_default()
            .extend(std::iter::repeat_n(failure, count));
        self
    }

    /// On every request, notes how many outcomes the ledger at `path` holds.
    pub fn watch_ledger(mut self, path: &Path) -> Self {
        self.watched_ledger = Some(path.to_path_buf());
        self
    }

    /// Saved ledger sizes seen at each request, in order.
    pub fn saved_outcomes(&self) -> Vec<usize> {
        self.saved_outcomes.lock().unwrap().clone()
    }

    /// Output names requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, output_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.as_str() == output_name)
            .count()
    }

    pub fn artifact_path(&self, output_name: &str) -> PathBuf {
        self.dir.join(format!("{output_name}.csv"))
    }

    fn rows_for(&self, range: &DateRange) -> u64 {
        range
            .iter_days()
            .map(|day| self.day_rows.get(&day).copied().unwrap_or(self.rows_per_day))
            .sum()
    }

    fn next_failure(&self, output_name: &str) -> Option<ScriptedFailure> {
        self.failures
            .lock()
            .unwrap()
            .get_mut(output_name)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl Exporter for SimulatedPortal {
    async fn download(
        &self,
        range: DateRange,
        output_name: &str,
    ) -> Result<ExportedFile, DownloadError> {
        self.calls.lock().unwrap().push(output_name.to_string());
        if let Some(path) = &self.watched_ledger {
            let saved = BackfillLedger::load(path).unwrap().len();
            self.saved_outcomes.lock().unwrap().push(saved);
        }

        match self.next_failure(output_name) {
            Some(ScriptedFailure::Timeout) => return Err(DownloadError::timeout(range, None)),
            Some(ScriptedFailure::Fatal(cause)) => return Err(DownloadError::fatal(cause)),
            None => {}
        }

        let mut body = String::from("contract_id;signed_on\n");
        let mut id = 0;
        for day in range.iter_days() {
            let rows = self.day_rows.get(&day).copied().unwrap_or(self.rows_per_day);
            for _ in 0..rows {
                id += 1;
                writeln!(body, "{id};{day}").unwrap();
            }
        }

        let path = self.artifact_path(output_name);
        std::fs::write(&path, body).map_err(|e| DownloadError::io(&path, e))?;

        let row_count = self.rows_for(&range);
        if row_count > self.row_limit {
            return Err(DownloadError::capacity_exceeded(
                row_count,
                self.row_limit,
                path,
            ));
        }
        Ok(ExportedFile { path, row_count })
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[allow(dead_code)]
impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
