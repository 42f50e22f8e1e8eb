//! Calendar range arithmetic for month, week and day partitions.
//!
//! All ranges are inclusive on both ends. Week partitions run Monday through
//! Sunday and are clipped so they never leave the range they partition, nor
//! cross a month boundary.
//!
//! # Example
//!
//! ```
//! use backfill_core::range::{YearMonth, week_bounds};
//!
//! let april = YearMonth::new(2023, 4).unwrap().bounds();
//! let weeks = week_bounds(&april);
//! // 2023-04-01 is a Saturday, so the first week part is two days long.
//! assert_eq!(weeks[0].days(), 2);
//! assert_eq!(weeks.len(), 5);
//! ```

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when constructing ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// Start date falls after end date.
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested start.
        start: NaiveDate,
        /// Requested end.
        end: NaiveDate,
    },

    /// Year/month pair does not name a calendar month.
    #[error("invalid calendar month {year}-{month:02}")]
    InvalidMonth {
        /// Requested year.
        year: i32,
        /// Requested month (1-12 expected).
        month: u32,
    },
}

/// Inclusive calendar date range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting `start > end`.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::InvalidRange`] when the bounds are reversed.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a range covering exactly one day.
    #[must_use]
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// First day of the range.
    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range.
    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days in the range (always >= 1).
    #[must_use]
    pub fn days(&self) -> u64 {
        // start <= end is guaranteed by construction
        (self.end - self.start).num_days().unsigned_abs() + 1
    }

    /// Returns true if `day` falls inside the range.
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Iterates over every day in the range, in order.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |day| *day <= self.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// A calendar month, used as the unit the backfill driver steps through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Creates a month key.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::InvalidMonth`] when `month` is outside 1-12 or the
    /// year is outside chrono's supported range.
    pub fn new(year: i32, month: u32) -> Result<Self, RangeError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(RangeError::InvalidMonth { year, month });
        }
        Ok(Self { year, month })
    }

    /// The month containing `day`.
    #[must_use]
    pub fn of(day: NaiveDate) -> Self {
        Self {
            year: day.year(),
            month: day.month(),
        }
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.year
    }

    #[must_use]
    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the month.
    #[must_use]
    pub fn first_day(&self) -> NaiveDate {
        // Validated in the constructors.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the month.
    #[must_use]
    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// The following calendar month.
    #[must_use]
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Full calendar bounds of the month.
    #[must_use]
    pub fn bounds(&self) -> DateRange {
        DateRange {
            start: self.first_day(),
            end: self.last_day(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// First and last calendar day of the given month.
///
/// # Errors
///
/// Returns [`RangeError::InvalidMonth`] for an out-of-range month.
pub fn month_bounds(year: i32, month: u32) -> Result<DateRange, RangeError> {
    Ok(YearMonth::new(year, month)?.bounds())
}

/// Splits a range into Monday-Sunday spans.
///
/// The first span starts at `range.start()` and the last ends at
/// `range.end()`; either may be a partial week. Spans are additionally cut at
/// month boundaries, so for a month range the union of the result is exactly
/// the month.
#[must_use]
pub fn week_bounds(range: &DateRange) -> Vec<DateRange> {
    let mut spans = Vec::new();
    let mut current = range.start;

    loop {
        let to_sunday = u64::from(6 - current.weekday().num_days_from_monday());
        let sunday = current
            .checked_add_days(Days::new(to_sunday))
            .unwrap_or(NaiveDate::MAX);
        let end = sunday
            .min(range.end)
            .min(YearMonth::of(current).last_day());

        spans.push(DateRange {
            start: current,
            end,
        });

        match end.succ_opt() {
            Some(next) if next <= range.end => current = next,
            _ => break,
        }
    }

    spans
}

/// One single-day range per calendar day in `range`, in order.
#[must_use]
pub fn day_bounds(range: &DateRange) -> Vec<DateRange> {
    range.iter_days().map(DateRange::single_day).collect()
}

/// Every calendar month that contains at least one day of `range`.
#[must_use]
pub fn months_overlapping(range: &DateRange) -> Vec<YearMonth> {
    let last = YearMonth::of(range.end);
    let mut month = YearMonth::of(range.start);
    let mut months = vec![month];
    while month < last {
        month = month.next();
        months.push(month);
    }
    months
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn assert_exact_cover(parent: &DateRange, parts: &[DateRange]) {
        assert_eq!(parts.first().unwrap().start(), parent.start());
        assert_eq!(parts.last().unwrap().end(), parent.end());
        for pair in parts.windows(2) {
            assert_eq!(
                pair[0].end().succ_opt().unwrap(),
                pair[1].start(),
                "gap or overlap between {} and {}",
                pair[0],
                pair[1]
            );
        }
        let total: u64 = parts.iter().map(DateRange::days).sum();
        assert_eq!(total, parent.days());
    }

    // ==================== DateRange Tests ====================

    #[test]
    fn test_date_range_rejects_reversed_bounds() {
        let err = DateRange::new(date(2023, 3, 10), date(2023, 1, 5)).unwrap_err();
        assert!(matches!(err, RangeError::InvalidRange { .. }));
    }

    #[test]
    fn test_date_range_single_day_has_one_day() {
        let range = DateRange::single_day(date(2024, 2, 29));
        assert_eq!(range.days(), 1);
        assert!(range.contains(date(2024, 2, 29)));
        assert!(!range.contains(date(2024, 3, 1)));
    }

    #[test]
    fn test_date_range_display() {
        let range = DateRange::new(date(2023, 4, 1), date(2023, 4, 2)).unwrap();
        assert_eq!(range.to_string(), "2023-04-01..=2023-04-02");
    }

    // ==================== Month Tests ====================

    #[test]
    fn test_month_bounds_regular_month() {
        let range = month_bounds(2023, 4).unwrap();
        assert_eq!(range.start(), date(2023, 4, 1));
        assert_eq!(range.end(), date(2023, 4, 30));
    }

    #[test]
    fn test_month_bounds_leap_february() {
        assert_eq!(month_bounds(2024, 2).unwrap().end(), date(2024, 2, 29));
        assert_eq!(month_bounds(2023, 2).unwrap().end(), date(2023, 2, 28));
    }

    #[test]
    fn test_month_bounds_december() {
        let range = month_bounds(2023, 12).unwrap();
        assert_eq!(range.end(), date(2023, 12, 31));
    }

    #[test]
    fn test_month_bounds_invalid_month() {
        assert!(matches!(
            month_bounds(2023, 13),
            Err(RangeError::InvalidMonth { month: 13, .. })
        ));
        assert!(month_bounds(2023, 0).is_err());
    }

    #[test]
    fn test_year_month_next_wraps_year() {
        let dec = YearMonth::new(2023, 12).unwrap();
        assert_eq!(dec.next(), YearMonth::new(2024, 1).unwrap());
        assert_eq!(dec.to_string(), "2023-12");
    }

    // ==================== Week Tests ====================

    #[test]
    fn test_week_bounds_april_2023() {
        // 2023-04-01 is a Saturday.
        let weeks = week_bounds(&month_bounds(2023, 4).unwrap());
        let expected = [(1, 2), (3, 9), (10, 16), (17, 23), (24, 30)];
        assert_eq!(weeks.len(), expected.len());
        for (week, (start, end)) in weeks.iter().zip(expected) {
            assert_eq!(week.start(), date(2023, 4, start));
            assert_eq!(week.end(), date(2023, 4, end));
        }
    }

    #[test]
    fn test_week_bounds_month_starting_monday() {
        // 2023-05-01 is a Monday, 2023-05-31 a Wednesday.
        let weeks = week_bounds(&month_bounds(2023, 5).unwrap());
        assert_eq!(weeks.len(), 5);
        assert_eq!(weeks[0].days(), 7);
        assert_eq!(weeks[4].start(), date(2023, 5, 29));
        assert_eq!(weeks[4].end(), date(2023, 5, 31));
    }

    #[test]
    fn test_week_bounds_always_cover_month_exactly() {
        for year in [2020, 2023, 2024] {
            for month in 1..=12 {
                let range = month_bounds(year, month).unwrap();
                let weeks = week_bounds(&range);
                assert_exact_cover(&range, &weeks);
                for week in &weeks {
                    assert!(week.days() <= 7);
                    assert_eq!(YearMonth::of(week.start()), YearMonth::of(week.end()));
                }
            }
        }
    }

    #[test]
    fn test_week_bounds_short_range_single_span() {
        let range = DateRange::new(date(2023, 4, 4), date(2023, 4, 6)).unwrap();
        let weeks = week_bounds(&range);
        assert_eq!(weeks, vec![range]);
    }

    #[test]
    fn test_week_bounds_never_cross_month() {
        let range = DateRange::new(date(2023, 4, 27), date(2023, 5, 3)).unwrap();
        let weeks = week_bounds(&range);
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].end(), date(2023, 4, 30));
        assert_eq!(weeks[1].start(), date(2023, 5, 1));
    }

    // ==================== Day Tests ====================

    #[test]
    fn test_day_bounds_one_per_day() {
        let week = DateRange::new(date(2023, 4, 3), date(2023, 4, 9)).unwrap();
        let days = day_bounds(&week);
        assert_eq!(days.len(), 7);
        assert!(days.iter().all(|d| d.days() == 1));
        assert_exact_cover(&week, &days);
    }

    #[test]
    fn test_weeks_and_days_compose_back_to_month() {
        let month = month_bounds(2024, 2).unwrap();
        let days: Vec<DateRange> = week_bounds(&month).iter().flat_map(day_bounds).collect();
        assert_eq!(days.len(), 29);
        assert_exact_cover(&month, &days);
    }

    // ==================== Month Enumeration Tests ====================

    #[test]
    fn test_months_overlapping_uses_whole_months() {
        let range = DateRange::new(date(2023, 1, 5), date(2023, 3, 10)).unwrap();
        let months = months_overlapping(&range);
        let labels: Vec<String> = months.iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["2023-01", "2023-02", "2023-03"]);
    }

    #[test]
    fn test_months_overlapping_across_year_boundary() {
        let range = DateRange::new(date(2022, 11, 30), date(2023, 1, 1)).unwrap();
        assert_eq!(months_overlapping(&range).len(), 3);
    }

    #[test]
    fn test_months_overlapping_single_day() {
        let range = DateRange::single_day(date(2023, 6, 15));
        assert_eq!(months_overlapping(&range), vec![YearMonth::new(2023, 6).unwrap()]);
    }
}
