//! Month -> week -> day splitting driven by row-cap overflows.
//!
//! The engine processes one calendar month as an explicit worklist of
//! [`PartitionNode`]s in chronological order:
//!
//! - **Month**: attempted first. On a capacity overflow it is replaced by its
//!   Monday-Sunday week parts, numbered from 0.
//! - **Week**: on a capacity overflow it is replaced by its days, which carry
//!   the week's part index. A timeout or fatal failure skips the week only.
//! - **Day**: terminal. A capacity overflow is recorded as an incomplete leaf.
//!
//! A timeout or fatal failure of the month node itself aborts the month and is
//! reported to the caller, which stops the whole run.
//!
//! A split node records no outcome of its own; its children's outcomes
//! replace it. Leaf outcomes go into the ledger as soon as they are known, so
//! an interrupted month keeps its finished leaves.

use std::collections::VecDeque;

use chrono::Datelike;
use tracing::{debug, info, instrument, warn};

use super::{NodeLevel, PartitionNode};
use crate::download::AttemptRunner;
use crate::ledger::{AttemptOutcome, AttemptResult, BackfillLedger};
use crate::range::{DateRange, YearMonth, day_bounds, week_bounds};

/// How a month ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthStatus {
    /// Every leaf was downloaded under the cap (now or in an earlier run).
    Complete,
    /// The month finished, but some week or day leaves failed or hit the cap
    /// at day granularity.
    Partial,
    /// The month-level attempt itself timed out or failed.
    Aborted {
        /// Why the month attempt failed.
        cause: String,
    },
}

/// Result of processing one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthReport {
    pub month: YearMonth,
    pub status: MonthStatus,
    /// Outcomes of the leaves attempted during this pass, in order.
    pub outcomes: Vec<AttemptOutcome>,
    /// Leaves skipped because the ledger already held a success for them.
    pub skipped: usize,
}

/// Splits a month until every leaf fits under the row cap.
///
/// The engine holds no state between months; everything it needs to resume
/// comes from the ledger passed to [`PartitionEngine::run_month`].
#[derive(Debug, Clone)]
pub struct PartitionEngine {
    runner: AttemptRunner,
}

impl PartitionEngine {
    #[must_use]
    pub fn new(runner: AttemptRunner) -> Self {
        Self { runner }
    }

    /// Downloads one whole calendar month, splitting on capacity overflow.
    ///
    /// Leaves already marked successful in `ledger` are skipped, and nodes
    /// that were split in an earlier run are expanded without repeating
    /// their oversized attempt. New outcomes are appended to `ledger`.
    pub async fn run_month(&self, month: YearMonth, ledger: &mut BackfillLedger) -> MonthReport {
        self.run_month_with_checkpoint(month, ledger, |_| {}).await
    }

    /// Like [`PartitionEngine::run_month`], calling `checkpoint` with the
    /// updated ledger after every recorded leaf.
    #[instrument(skip(self, ledger, checkpoint), fields(month = %month))]
    pub async fn run_month_with_checkpoint<F>(
        &self,
        month: YearMonth,
        ledger: &mut BackfillLedger,
        mut checkpoint: F,
    ) -> MonthReport
    where
        F: FnMut(&BackfillLedger) + Send,
    {
        let mut worklist: VecDeque<(PartitionNode, DateRange)> = VecDeque::new();
        worklist.push_back((PartitionNode::month(month), month.bounds()));

        let mut outcomes = Vec::new();
        let mut skipped = 0;
        let mut partial = false;

        while let Some((node, range)) = worklist.pop_front() {
            if ledger.has_success(&node, &range) {
                debug!(node = %node, "already downloaded, skipping");
                skipped += 1;
                continue;
            }

            if !node.is_terminal() && ledger.has_descendant_outcomes(&node) {
                debug!(node = %node, "split in an earlier run, expanding");
                push_children_front(&mut worklist, &node, &range);
                continue;
            }

            let outcome = self.runner.attempt(node, range).await;

            match (&outcome.result, node.level) {
                (AttemptResult::Success { .. }, _) => {
                    record_leaf(ledger, &mut outcomes, outcome, &mut checkpoint);
                }
                (
                    AttemptResult::CapacityExceeded {
                        row_count, limit, ..
                    },
                    NodeLevel::Month | NodeLevel::Week { .. },
                ) => {
                    warn!(
                        node = %node,
                        row_count,
                        limit,
                        "row cap exceeded, splitting"
                    );
                    push_children_front(&mut worklist, &node, &range);
                }
                (
                    AttemptResult::CapacityExceeded {
                        row_count, limit, ..
                    },
                    NodeLevel::Day { .. },
                ) => {
                    warn!(
                        node = %node,
                        row_count,
                        limit,
                        "single day still exceeds the row cap, data for this day is incomplete"
                    );
                    partial = true;
                    record_leaf(ledger, &mut outcomes, outcome, &mut checkpoint);
                }
                (failure, NodeLevel::Month) => {
                    let cause = failure.describe();
                    record_leaf(ledger, &mut outcomes, outcome, &mut checkpoint);
                    return MonthReport {
                        month,
                        status: MonthStatus::Aborted { cause },
                        outcomes,
                        skipped,
                    };
                }
                (failure, _) => {
                    warn!(node = %node, error = %failure.describe(), "skipping period after unrecoverable error");
                    partial = true;
                    record_leaf(ledger, &mut outcomes, outcome, &mut checkpoint);
                }
            }
        }

        let status = if partial {
            MonthStatus::Partial
        } else {
            MonthStatus::Complete
        };
        info!(
            attempted = outcomes.len(),
            skipped,
            status = ?status,
            "month finished"
        );

        MonthReport {
            month,
            status,
            outcomes,
            skipped,
        }
    }
}

/// Child nodes of a split, in chronological order.
///
/// Month children are week parts numbered from 0; week children are days
/// tagged with the week's part index. Day nodes have no children.
#[must_use]
pub fn children(node: &PartitionNode, range: &DateRange) -> Vec<(PartitionNode, DateRange)> {
    match node.level {
        NodeLevel::Month => week_bounds(range)
            .into_iter()
            .enumerate()
            .map(|(part, week)| (PartitionNode::week(node.month, part), week))
            .collect(),
        NodeLevel::Week { part } => day_bounds(range)
            .into_iter()
            .map(|day| {
                (
                    PartitionNode::day(node.month, part, day.start().day()),
                    day,
                )
            })
            .collect(),
        NodeLevel::Day { .. } => Vec::new(),
    }
}

fn record_leaf<F>(
    ledger: &mut BackfillLedger,
    outcomes: &mut Vec<AttemptOutcome>,
    outcome: AttemptOutcome,
    checkpoint: &mut F,
) where
    F: FnMut(&BackfillLedger),
{
    ledger.record(outcome.clone());
    outcomes.push(outcome);
    checkpoint(ledger);
}

fn push_children_front(
    worklist: &mut VecDeque<(PartitionNode, DateRange)>,
    node: &PartitionNode,
    range: &DateRange,
) {
    for child in children(node, range).into_iter().rev() {
        worklist.push_front(child);
    }
}
