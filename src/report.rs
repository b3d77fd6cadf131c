//! # Reliability Report
//!
//! Summarises a classified interval history: time spent in each state, how
//! often moves failed, and how failures relate to the rotator cable wrap.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, TimeDelta};

use crate::csu::interval::Interval;
use crate::csu::protocol::OperationalState;

/// Count and accumulated time for one state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StateSummary {
    pub count: usize,
    pub total: TimeDelta,
}

/// Moves and failed moves in one calendar year
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearSummary {
    pub moves: usize,
    pub failures: usize,
}

/// Reliability statistics for a classified history
#[derive(Debug, Clone, PartialEq)]
pub struct ReliabilityReport {
    pub intervals: usize,
    pub states: BTreeMap<OperationalState, StateSummary>,
    pub moves: usize,
    pub failed_moves: usize,
    /// Failed moves whose move began near a wrap boundary
    pub failed_near_wrap: usize,
    /// Moves that began near a wrap boundary
    pub moves_near_wrap: usize,
    /// Failed moves that failed within the prompt-failure threshold
    pub prompt_failures: usize,
    pub prompt_threshold: TimeDelta,
    pub by_year: BTreeMap<i32, YearSummary>,
}

impl ReliabilityReport {
    /// Build the report from a history already run through the failure pass
    ///
    /// A failed move counts as prompt when its `Moving` interval lasted at
    /// most `prompt_threshold`.
    #[must_use]
    pub fn from_intervals(intervals: &[Interval], prompt_threshold: TimeDelta) -> Self {
        let mut report = Self {
            intervals: intervals.len(),
            states: BTreeMap::new(),
            moves: 0,
            failed_moves: 0,
            failed_near_wrap: 0,
            moves_near_wrap: 0,
            prompt_failures: 0,
            prompt_threshold,
            by_year: BTreeMap::new(),
        };

        for interval in intervals {
            let summary = report.states.entry(interval.status).or_default();
            summary.count += 1;
            summary.total += interval.duration.max(TimeDelta::zero());

            if interval.status != OperationalState::Moving {
                continue;
            }

            let year = report.by_year.entry(interval.begin.year()).or_default();
            year.moves += 1;
            report.moves += 1;
            if interval.near_wrap_limit {
                report.moves_near_wrap += 1;
            }

            if interval.move_failed {
                year.failures += 1;
                report.failed_moves += 1;
                if interval.near_wrap_limit {
                    report.failed_near_wrap += 1;
                }
                if interval.duration <= prompt_threshold {
                    report.prompt_failures += 1;
                }
            }
        }

        report
    }

    /// Fraction of moves that failed, `None` without moves
    #[must_use]
    pub fn failure_rate(&self) -> Option<f64> {
        ratio(self.failed_moves, self.moves)
    }

    /// Fraction of moves started near a wrap boundary that failed
    #[must_use]
    pub fn near_wrap_failure_rate(&self) -> Option<f64> {
        ratio(self.failed_near_wrap, self.moves_near_wrap)
    }
}

fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

impl fmt::Display for ReliabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CSU reliability report ({} intervals)", self.intervals)?;
        writeln!(f)?;
        writeln!(f, "{:<12} {:>8} {:>14}", "State", "Count", "Hours")?;
        for (state, summary) in &self.states {
            let hours = summary.total.num_seconds() as f64 / 3600.0;
            writeln!(f, "{:<12} {:>8} {:>14.2}", state.to_string(), summary.count, hours)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Moves: {}  failed: {} ({})",
            self.moves,
            self.failed_moves,
            percent(self.failure_rate())
        )?;
        writeln!(
            f,
            "Near wrap limit: {} moves, {} failed ({})",
            self.moves_near_wrap,
            self.failed_near_wrap,
            percent(self.near_wrap_failure_rate())
        )?;
        writeln!(
            f,
            "Prompt failures (within {}s of move start): {}",
            self.prompt_threshold.num_seconds(),
            self.prompt_failures
        )?;

        if !self.by_year.is_empty() {
            writeln!(f)?;
            writeln!(f, "{:<6} {:>8} {:>9} {:>9}", "Year", "Moves", "Failures", "Rate")?;
            for (year, summary) in &self.by_year {
                writeln!(
                    f,
                    "{:<6} {:>8} {:>9} {:>9}",
                    year,
                    summary.moves,
                    summary.failures,
                    percent(ratio(summary.failures, summary.moves))
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use OperationalState::*;

    fn interval(year: i32, status: OperationalState, secs: i64, near_wrap: bool, failed: bool) -> Interval {
        let begin = NaiveDateTime::parse_from_str(&format!("{}-06-01 10:00:00", year), "%Y-%m-%d %H:%M:%S").unwrap();
        Interval {
            source: format!("{}.log", year),
            status,
            begin,
            end: begin + TimeDelta::seconds(secs),
            duration: TimeDelta::seconds(secs),
            x_accel: None,
            y_accel: None,
            accel_age: None,
            rotposn_begin: None,
            rotposn_end: None,
            near_wrap_limit: near_wrap,
            bars_in_motion: 0,
            move_failed: failed,
        }
    }

    fn history() -> Vec<Interval> {
        vec![
            interval(2018, Moving, 30, false, false),
            interval(2018, Idle, 3600, false, false),
            interval(2018, Moving, 90, true, true),
            interval(2018, Error, 600, false, false),
            interval(2019, Moving, 400, true, true),
            interval(2019, Error, 1800, false, false),
            interval(2019, Moving, 20, true, false),
        ]
    }

    #[test]
    fn test_counts() {
        let report = ReliabilityReport::from_intervals(&history(), TimeDelta::seconds(120));

        assert_eq!(report.intervals, 7);
        assert_eq!(report.moves, 4);
        assert_eq!(report.failed_moves, 2);
        assert_eq!(report.moves_near_wrap, 3);
        assert_eq!(report.failed_near_wrap, 2);
        assert_eq!(report.prompt_failures, 1);
        assert_eq!(report.states[&Error].count, 2);
        assert_eq!(report.states[&Error].total, TimeDelta::seconds(2400));
        assert_eq!(report.states[&Idle].count, 1);
    }

    #[test]
    fn test_rates() {
        let report = ReliabilityReport::from_intervals(&history(), TimeDelta::seconds(120));
        assert_eq!(report.failure_rate(), Some(0.5));
        assert!((report.near_wrap_failure_rate().unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_by_year() {
        let report = ReliabilityReport::from_intervals(&history(), TimeDelta::seconds(120));
        assert_eq!(report.by_year[&2018], YearSummary { moves: 2, failures: 1 });
        assert_eq!(report.by_year[&2019], YearSummary { moves: 2, failures: 1 });
    }

    #[test]
    fn test_prompt_threshold_is_inclusive() {
        let report = ReliabilityReport::from_intervals(&history(), TimeDelta::seconds(90));
        assert_eq!(report.prompt_failures, 1);

        let report = ReliabilityReport::from_intervals(&history(), TimeDelta::seconds(89));
        assert_eq!(report.prompt_failures, 0);
    }

    #[test]
    fn test_empty_history() {
        let report = ReliabilityReport::from_intervals(&[], TimeDelta::seconds(120));
        assert_eq!(report.failure_rate(), None);
        assert!(report.states.is_empty());

        let text = report.to_string();
        assert!(text.contains("0 intervals"));
        assert!(text.contains("n/a"));
    }

    #[test]
    fn test_display() {
        let text = ReliabilityReport::from_intervals(&history(), TimeDelta::seconds(120)).to_string();
        assert!(text.contains("Moves: 4  failed: 2 (50.00%)"));
        assert!(text.contains("Prompt failures (within 120s of move start): 1"));
        assert!(text.contains("2019"));
    }
}
