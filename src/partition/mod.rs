//! Partition nodes and the month -> week -> day splitting engine.
//!
//! A [`PartitionNode`] identifies one download unit inside a calendar month
//! and determines the artifact name it is saved under:
//!
//! | Node | Artifact |
//! |------|----------|
//! | month | `contracts_2023-04.csv` |
//! | week part 2 | `contracts_2023-04-part2.csv` |
//! | day 5 of week part 2 | `contracts_2023-04-part2-day05.csv` |
//!
//! Week parts are numbered from 0 in chronological order within the month;
//! days carry their day-of-month, so names never collide after a split.

pub mod engine;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::range::YearMonth;

pub use engine::{MonthReport, MonthStatus, PartitionEngine};

/// Prefix shared by every exported artifact.
pub const ARTIFACT_PREFIX: &str = "contracts_";

/// Extension of exported artifacts.
pub const ARTIFACT_EXTENSION: &str = "csv";

/// Granularity of a partition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum NodeLevel {
    /// The whole calendar month.
    Month,
    /// A Monday-Sunday span of the month, by chronological part index.
    Week {
        /// 0-based chronological index within the month.
        part: usize,
    },
    /// A single day inside a split week part.
    Day {
        /// Part index of the week this day was split from.
        part: usize,
        /// Day of month (1-31).
        day: u32,
    },
}

/// One node of the month/week/day partition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionNode {
    /// Calendar month this node belongs to.
    pub month: YearMonth,
    /// Granularity and ordinal within the month.
    #[serde(flatten)]
    pub level: NodeLevel,
}

impl PartitionNode {
    #[must_use]
    pub fn month(month: YearMonth) -> Self {
        Self {
            month,
            level: NodeLevel::Month,
        }
    }

    #[must_use]
    pub fn week(month: YearMonth, part: usize) -> Self {
        Self {
            month,
            level: NodeLevel::Week { part },
        }
    }

    #[must_use]
    pub fn day(month: YearMonth, part: usize, day: u32) -> Self {
        Self {
            month,
            level: NodeLevel::Day { part, day },
        }
    }

    /// Returns true for day nodes, which are never split further.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.level, NodeLevel::Day { .. })
    }

    /// Returns true if `other` lies strictly below this node in the tree.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &PartitionNode) -> bool {
        if self.month != other.month {
            return false;
        }
        match (self.level, other.level) {
            (NodeLevel::Month, NodeLevel::Week { .. } | NodeLevel::Day { .. }) => true,
            (NodeLevel::Week { part }, NodeLevel::Day { part: day_part, .. }) => part == day_part,
            _ => false,
        }
    }

    /// Output name base handed to the exporter, e.g. `contracts_2023-04-part2`.
    #[must_use]
    pub fn output_name(&self) -> String {
        format!("{ARTIFACT_PREFIX}{self}")
    }

    /// Full artifact file name, e.g. `contracts_2023-04-part2-day05.csv`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{ARTIFACT_EXTENSION}", self.output_name())
    }
}

impl fmt::Display for PartitionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NodeLevel::Month => write!(f, "{}", self.month),
            NodeLevel::Week { part } => write!(f, "{}-part{part}", self.month),
            NodeLevel::Day { part, day } => write!(f, "{}-part{part}-day{day:02}", self.month),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn april() -> YearMonth {
        YearMonth::new(2023, 4).unwrap()
    }

    #[test]
    fn test_month_node_naming() {
        let node = PartitionNode::month(april());
        assert_eq!(node.to_string(), "2023-04");
        assert_eq!(node.output_name(), "contracts_2023-04");
        assert_eq!(node.file_name(), "contracts_2023-04.csv");
    }

    #[test]
    fn test_week_node_naming() {
        let node = PartitionNode::week(april(), 2);
        assert_eq!(node.file_name(), "contracts_2023-04-part2.csv");
    }

    #[test]
    fn test_day_node_naming_zero_pads_day() {
        let node = PartitionNode::day(april(), 2, 5);
        assert_eq!(node.file_name(), "contracts_2023-04-part2-day05.csv");
        let node = PartitionNode::day(april(), 4, 30);
        assert_eq!(node.file_name(), "contracts_2023-04-part4-day30.csv");
    }

    #[test]
    fn test_only_day_nodes_are_terminal() {
        assert!(!PartitionNode::month(april()).is_terminal());
        assert!(!PartitionNode::week(april(), 0).is_terminal());
        assert!(PartitionNode::day(april(), 0, 1).is_terminal());
    }

    #[test]
    fn test_ancestry() {
        let month = PartitionNode::month(april());
        let week = PartitionNode::week(april(), 1);
        let day = PartitionNode::day(april(), 1, 4);
        let other_day = PartitionNode::day(april(), 2, 10);

        assert!(month.is_ancestor_of(&week));
        assert!(month.is_ancestor_of(&day));
        assert!(week.is_ancestor_of(&day));
        assert!(!week.is_ancestor_of(&other_day));
        assert!(!week.is_ancestor_of(&week));
        assert!(!day.is_ancestor_of(&day));

        let may = PartitionNode::month(YearMonth::new(2023, 5).unwrap());
        assert!(!may.is_ancestor_of(&day));
    }

    #[test]
    fn test_node_serializes_with_level_tag() {
        let node = PartitionNode::day(april(), 1, 4);
        let json = serde_json::to_value(node).unwrap();
        assert_eq!(json["level"], "day");
        assert_eq!(json["part"], 1);
        assert_eq!(json["day"], 4);

        let back: PartitionNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
