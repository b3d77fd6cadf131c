//! # Failure Classifier
//!
//! Marks every `Moving` interval that is immediately followed by an `Error`
//! interval as a failed move.
//!
//! Must run on the merged, chronologically sorted history of the whole
//! corpus: log files roll over at arbitrary points, so the `Error` that ends
//! a move can be the first interval of the next file. States still open at
//! the end of the corpus are not intervals but still count as the record that
//! follows a move.

use std::cmp::Ordering;

use chrono::NaiveDateTime;

use super::interval::Interval;
use super::protocol::OperationalState;
use super::tracker::TrailingState;

/// Chronological order used for the corpus-wide merge
///
/// By `begin`, then `end`, then source file name.
#[must_use]
pub fn chronological(a: &Interval, b: &Interval) -> Ordering {
    a.begin
        .cmp(&b.begin)
        .then_with(|| a.end.cmp(&b.end))
        .then_with(|| a.source.cmp(&b.source))
}

/// Merge per-file interval sequences into one chronological sequence
#[must_use]
pub fn merge_chronologically(per_file: Vec<Vec<Interval>>) -> Vec<Interval> {
    let mut merged: Vec<Interval> = per_file.into_iter().flatten().collect();
    merged.sort_by(chronological);
    merged
}

/// Set `move_failed` on every interval of a chronologically sorted sequence.
///
/// Every flag is recomputed, so running the pass again yields the same result.
/// Returns the number of failed moves.
///
/// # Panics
///
/// Panics if `intervals` is not sorted by `begin`; the adjacency rule is
/// meaningless on unsorted input.
///
/// # Examples
///
/// ```
/// # use chrono::{NaiveDateTime, TimeDelta};
/// # use csu_replay::csu::interval::Interval;
/// use csu_replay::csu::failure::classify_failures;
/// use csu_replay::csu::protocol::OperationalState;
/// # let t0 = NaiveDateTime::parse_from_str("2019-03-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
/// # let interval = |status, begin: NaiveDateTime, secs| Interval {
/// #     source: "190301.log".into(), status, begin, end: begin + TimeDelta::seconds(secs),
/// #     duration: TimeDelta::seconds(secs), x_accel: None, y_accel: None, accel_age: None,
/// #     rotposn_begin: None, rotposn_end: None, near_wrap_limit: false,
/// #     bars_in_motion: 0, move_failed: false,
/// # };
///
/// let mut history = vec![
///     interval(OperationalState::Moving, t0, 5),
///     interval(OperationalState::Error, t0 + TimeDelta::seconds(5), 60),
/// ];
///
/// assert_eq!(classify_failures(&mut history), 1);
/// assert!(history[0].move_failed);
/// assert!(!history[1].move_failed);
/// ```
pub fn classify_failures(intervals: &mut [Interval]) -> usize {
    classify_failures_with_open(intervals, &[])
}

/// [`classify_failures`] with states left open at the end of the corpus
///
/// An open state sorts after every interval that begins at the same instant.
/// A `Moving` interval followed by an open `Error` state is a failed move.
///
/// # Panics
///
/// Panics if `intervals` is not sorted by `begin`.
pub fn classify_failures_with_open(intervals: &mut [Interval], open: &[TrailingState]) -> usize {
    assert!(
        intervals.windows(2).all(|pair| pair[0].begin <= pair[1].begin),
        "intervals must be sorted by begin before failure classification"
    );

    // (begin, status, index into intervals); stable sort keeps intervals first on ties
    let mut timeline: Vec<(NaiveDateTime, OperationalState, Option<usize>)> = intervals
        .iter()
        .enumerate()
        .map(|(i, interval)| (interval.begin, interval.status, Some(i)))
        .chain(open.iter().map(|tail| (tail.entered_at(), tail.status(), None)))
        .collect();
    timeline.sort_by_key(|(begin, _, _)| *begin);

    for interval in intervals.iter_mut() {
        interval.move_failed = false;
    }

    let mut failed = 0;
    for pair in timeline.windows(2) {
        if let ((_, OperationalState::Moving, Some(i)), (_, OperationalState::Error, _)) = (pair[0], pair[1]) {
            intervals[i].move_failed = true;
            failed += 1;
        }
    }

    failed
}
