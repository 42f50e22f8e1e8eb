//! Bounded retry of single export attempts.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying export errors, and the [`AttemptRunner`] that wraps one
//! collaborator call per try.
//!
//! # Overview
//!
//! When an export fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Timeouts; retried after a fixed delay
//! - [`FailureType::CapacityExceeded`] - Row cap hit; never retried, it is the split trigger
//! - [`FailureType::Fatal`] - Anything else; never retried
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use backfill_core::download::{DownloadError, FailureType, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(5));
//! let error = DownloadError::fatal("captcha not solved");
//! assert_eq!(classify_error(&error), FailureType::Fatal);
//! assert!(matches!(policy.should_retry(FailureType::Transient, 1), RetryDecision::Retry { .. }));
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::pacer::Sleeper;
use super::{DownloadError, Exporter};
use crate::ledger::{AttemptOutcome, AttemptResult};
use crate::partition::PartitionNode;
use crate::range::DateRange;

/// Default number of retries after the first try.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between tries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Classification of export failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The collaborator timed out; the same request may succeed later.
    Transient,

    /// The export exceeded the row cap. Retrying the same range cannot help;
    /// the caller narrows the range instead.
    CapacityExceeded,

    /// Unexpected failure. Not retried.
    Fatal,
}

/// Decision on whether to retry a failed try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the specified delay.
    Retry {
        /// How long to wait before the next try.
        delay: Duration,
        /// Which try this will be (1-indexed, so the first retry is try 2).
        attempt: u32,
    },

    /// Stop trying.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry configuration: a fixed number of retries with a fixed delay.
///
/// A node that only ever times out is tried `max_retries + 1` times and the
/// delay is taken `max_retries` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial try.
    max_retries: u32,

    /// Delay between consecutive tries.
    retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    #[must_use]
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Creates a policy with a custom retry count and the default delay.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total tries including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Determines whether to retry after try number `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::CapacityExceeded => {
                return RetryDecision::DoNotRetry {
                    reason: "row cap exceeded - range must be split".to_string(),
                };
            }
            FailureType::Fatal => {
                return RetryDecision::DoNotRetry {
                    reason: "fatal failure - retry would not help".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if attempt >= self.max_attempts() {
            debug!(attempt, max = self.max_attempts(), "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = self.retry_delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay: self.retry_delay,
            attempt: attempt + 1,
        }
    }
}

/// Classifies an export error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Timeout | Transient |
/// | CapacityExceeded | CapacityExceeded |
/// | Fatal | Fatal |
/// | Io | Fatal |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Timeout { .. } => FailureType::Transient,
        DownloadError::CapacityExceeded { .. } => FailureType::CapacityExceeded,
        DownloadError::Fatal { .. } | DownloadError::Io { .. } => FailureType::Fatal,
    }
}

/// Runs one leaf attempt against the collaborator with bounded retry.
///
/// This is the only component that calls the [`Exporter`].
#[derive(Clone)]
pub struct AttemptRunner {
    exporter: Arc<dyn Exporter>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for AttemptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptRunner")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AttemptRunner {
    #[must_use]
    pub fn new(exporter: Arc<dyn Exporter>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self {
            exporter,
            sleeper,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Exports `range` under `node`'s artifact name.
    ///
    /// Timeouts are retried per the policy. A capacity failure returns
    /// immediately, after the oversized artifact has been removed so a split's
    /// children never meet a stale file. Anything else is fatal.
    #[instrument(skip_all, fields(node = %node, range = %range))]
    pub async fn attempt(&self, node: PartitionNode, range: DateRange) -> AttemptOutcome {
        let output_name = node.output_name();
        let mut attempt = 1;

        let result = loop {
            info!(
                attempt,
                max_attempts = self.policy.max_attempts(),
                output = %output_name,
                "exporting period"
            );

            let error = match self.exporter.download(range, &output_name).await {
                Ok(file) => {
                    info!(path = %file.path.display(), rows = file.row_count, "export saved");
                    break AttemptResult::Success {
                        path: file.path,
                        row_count: file.row_count,
                    };
                }
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            match self.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(attempt, error = %error, delay_ms = delay.as_millis(), "export timed out, retrying");
                    self.sleeper.sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(reason = %reason, "not retrying");
                    break self.finish_failure(error, attempt).await;
                }
            }
        };

        AttemptOutcome {
            node,
            range,
            result,
        }
    }

    async fn finish_failure(&self, error: DownloadError, attempt: u32) -> AttemptResult {
        match error {
            DownloadError::CapacityExceeded {
                row_count,
                limit,
                path,
            } => {
                discard_artifact(&path).await;
                AttemptResult::CapacityExceeded {
                    path,
                    row_count,
                    limit,
                }
            }
            DownloadError::Timeout { .. } => {
                let retries_used = attempt.saturating_sub(1);
                warn!(retries_used, "export kept timing out, giving up on this period");
                AttemptResult::TransientFailure { retries_used }
            }
            other => {
                warn!(error = %other, "export failed");
                AttemptResult::FatalFailure {
                    cause: other.to_string(),
                }
            }
        }
    }
}

/// Removes an oversized artifact. A missing file is not an error.
async fn discard_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "deleted oversized artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to delete oversized artifact"),
    }
}
