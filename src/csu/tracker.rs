//! # Status Tracker
//!
//! Finite-state machine that replays the classified signals of one log file
//! and emits an [`Interval`] each time the CSU leaves a state.
//!
//! ## Transitions
//!
//! | From | Signal | To |
//! |------|--------|----|
//! | Idle | SetupStart | Setup |
//! | Setup | SetupComplete | Idle |
//! | Idle, Setup | MoveStart | Moving |
//! | Moving | MoveComplete | Idle |
//! | any | FatalError | Error |
//! | any | PowerDown | PowerDown |
//! | any | InitializeStart | Initialize |
//! | Initialize | InitializeComplete | Idle |
//!
//! Requests with no edge from the current state are dropped. The machine is
//! seeded as `Idle` at the first classified signal. The state still open at
//! end of file is handed back by [`StatusTracker::finish`] as a
//! [`TrailingState`], which the replay step closes at the first signal of the
//! next log file.
//!
//! Telemetry fields of emitted intervals are left unknown here and filled in
//! by the replay step.

use std::collections::BTreeSet;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, trace, warn};

use super::interval::Interval;
use super::protocol::{AccelAxis, BarActivity, OperationalState, Signal, TransitionKind};

/// Last known accelerometer readings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccelSnapshot {
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Timestamp of the most recent reading on either axis
    pub sampled_at: Option<NaiveDateTime>,
}

impl AccelSnapshot {
    /// Age of the readings as seen from `at`
    #[must_use]
    pub fn age_at(&self, at: NaiveDateTime) -> Option<TimeDelta> {
        self.sampled_at.map(|sampled| at - sampled)
    }

    fn update(&mut self, axis: AccelAxis, value: f64, at: NaiveDateTime) {
        match axis {
            AccelAxis::X => self.x = Some(value),
            AccelAxis::Y => self.y = Some(value),
        }
        self.sampled_at = Some(at);
    }
}

/// The state currently held, with what was known when it was entered
#[derive(Debug, Clone, PartialEq)]
struct OpenState {
    state: OperationalState,
    entered_at: NaiveDateTime,
    accel: AccelSnapshot,
    bars: BTreeSet<u8>,
}

impl OpenState {
    fn enter(state: OperationalState, entered_at: NaiveDateTime, accel: AccelSnapshot) -> Self {
        Self {
            state,
            entered_at,
            accel,
            bars: BTreeSet::new(),
        }
    }

    fn close(self, source: &str, end: NaiveDateTime) -> Interval {
        Interval {
            source: source.to_string(),
            status: self.state,
            begin: self.entered_at,
            end,
            duration: end - self.entered_at,
            x_accel: self.accel.x,
            y_accel: self.accel.y,
            accel_age: self.accel.age_at(self.entered_at),
            rotposn_begin: None,
            rotposn_end: None,
            near_wrap_limit: false,
            bars_in_motion: self.bars.len() as u32,
            move_failed: false,
        }
    }
}

/// State still open when a log file runs out
///
/// It has no end yet: the next signal that would close it may be the first
/// line of the following log file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingState {
    source: String,
    open: OpenState,
    last_seen: NaiveDateTime,
}

impl TrailingState {
    /// Log file the state was entered in
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn status(&self) -> OperationalState {
        self.open.state
    }

    #[must_use]
    pub fn entered_at(&self) -> NaiveDateTime {
        self.open.entered_at
    }

    /// Timestamp of the last classified signal in the file
    #[must_use]
    pub fn last_seen(&self) -> NaiveDateTime {
        self.last_seen
    }

    /// How long the state had been open at the end of the file
    #[must_use]
    pub fn open_for(&self) -> TimeDelta {
        self.last_seen - self.open.entered_at
    }

    /// Close the state at `end`, emitting its interval
    #[must_use]
    pub fn close_at(self, end: NaiveDateTime) -> Interval {
        self.open.close(&self.source, end)
    }
}

/// Replays the signal stream of a single log file
///
/// # Examples
///
/// ```
/// use csu_replay::csu::classifier::classify;
/// use csu_replay::csu::protocol::OperationalState;
/// use csu_replay::csu::tracker::StatusTracker;
///
/// let lines = [
///     "2019-03-01 10:00:00,000 [mosfire] DEBUG edu.ucla.astro.irlab.util.Property - Setting property <CSUStatus> to new value <Moving>.",
///     "2019-03-01 10:00:42,500 [mosfire] DEBUG edu.ucla.astro.irlab.util.Property - Setting property <CSUStatus> to new value <Move complete>.",
/// ];
///
/// let mut tracker = StatusTracker::new("190301.log");
/// let intervals: Vec<_> = lines
///     .iter()
///     .filter_map(|line| tracker.process(classify(line)))
///     .collect();
///
/// assert_eq!(intervals.len(), 1);
/// assert_eq!(intervals[0].status, OperationalState::Moving);
/// assert_eq!(intervals[0].duration.num_milliseconds(), 42_500);
/// ```
#[derive(Debug)]
pub struct StatusTracker {
    source: String,
    current: Option<OpenState>,
    accel: AccelSnapshot,
    last_seen: Option<NaiveDateTime>,
}

impl StatusTracker {
    /// Creates a tracker for the log file named `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            current: None,
            accel: AccelSnapshot::default(),
            last_seen: None,
        }
    }

    /// Current state, `None` until the first classified signal
    #[must_use]
    pub fn state(&self) -> Option<OperationalState> {
        self.current.as_ref().map(|open| open.state)
    }

    /// Latest accelerometer readings
    #[must_use]
    pub fn accel(&self) -> AccelSnapshot {
        self.accel
    }

    /// Processes one signal, returning the interval it closes, if any.
    pub fn process(&mut self, signal: Signal) -> Option<Interval> {
        let at = signal.timestamp()?;
        self.check_order(at);

        match signal {
            Signal::Transition { kind, at } => self.transition(kind, at),
            Signal::Accel { axis, value, at } => {
                self.seed(at);
                self.accel.update(axis, value, at);
                None
            }
            Signal::Bar { bar, activity, at } => {
                self.seed(at);
                match activity {
                    BarActivity::Moving => self.record_bar(bar),
                    BarActivity::Target(position) => {
                        trace!("{}: bar {} target {} mm", self.source, bar, position);
                    }
                }
                None
            }
            Signal::Unrecognized => None,
        }
    }

    /// Ends the replay, returning the state still open, if any.
    #[must_use]
    pub fn finish(self) -> Option<TrailingState> {
        let open = self.current?;
        let last_seen = self.last_seen.unwrap_or(open.entered_at);
        debug!(
            "{}: {} state entered at {} still open at end of log",
            self.source, open.state, open.entered_at
        );
        Some(TrailingState {
            source: self.source,
            open,
            last_seen,
        })
    }

    fn check_order(&mut self, at: NaiveDateTime) {
        if let Some(last) = self.last_seen {
            if at < last {
                warn!("{}: timestamp {} precedes previous line at {}", self.source, at, last);
            }
        }
        self.last_seen = Some(self.last_seen.map_or(at, |last| last.max(at)));
    }

    /// Seeds `Idle` at `at` if nothing has been seen yet
    fn seed(&mut self, at: NaiveDateTime) {
        if self.current.is_none() {
            trace!("{}: seeding Idle at {}", self.source, at);
            self.current = Some(OpenState::enter(OperationalState::Idle, at, self.accel));
        }
    }

    fn transition(&mut self, kind: TransitionKind, at: NaiveDateTime) -> Option<Interval> {
        let Some(state) = self.state() else {
            // First signal is itself a transition: the zero-length seed is not emitted
            match OperationalState::Idle.transition(kind) {
                Some(next) => self.current = Some(OpenState::enter(next, at, self.accel)),
                None => self.seed(at),
            }
            return None;
        };

        let Some(next) = state.transition(kind) else {
            trace!("{}: ignoring {:?} while {}", self.source, kind, state);
            return None;
        };

        let entered = OpenState::enter(next, at, self.accel);
        let closed = self.current.replace(entered)?;
        debug!("{}: {} -> {} at {}", self.source, closed.state, next, at);

        Some(closed.close(&self.source, at))
    }

    fn record_bar(&mut self, bar: u8) {
        match self.current.as_mut() {
            Some(open) if open.state.counts_bars() => {
                open.bars.insert(bar);
            }
            Some(open) => {
                trace!("{}: bar {} activity while {}, dropped", self.source, bar, open.state);
            }
            None => {}
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2019-03-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
            + TimeDelta::seconds(secs)
    }

    fn transition(kind: TransitionKind, secs: i64) -> Signal {
        Signal::Transition { kind, at: t(secs) }
    }

    fn bar_moving(bar: u8, secs: i64) -> Signal {
        Signal::Bar { bar, activity: BarActivity::Moving, at: t(secs) }
    }

    fn accel(axis: AccelAxis, value: f64, secs: i64) -> Signal {
        Signal::Accel { axis, value, at: t(secs) }
    }

    fn run(signals: Vec<Signal>) -> Vec<Interval> {
        let mut tracker = StatusTracker::new("test.log");
        signals.into_iter().filter_map(|s| tracker.process(s)).collect()
    }

    #[test]
    fn test_setup_then_complete() {
        let intervals = run(vec![
            transition(TransitionKind::SetupStart, 0),
            transition(TransitionKind::SetupComplete, 30),
        ]);

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].status, OperationalState::Setup);
        assert_eq!(intervals[0].begin, t(0));
        assert_eq!(intervals[0].end, t(30));
        assert_eq!(intervals[0].duration, TimeDelta::seconds(30));
    }

    #[test]
    fn test_move_counts_distinct_bars() {
        let intervals = run(vec![
            transition(TransitionKind::MoveStart, 0),
            bar_moving(3, 1),
            bar_moving(7, 2),
            bar_moving(3, 3),
            transition(TransitionKind::MoveComplete, 10),
        ]);

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].status, OperationalState::Moving);
        assert_eq!(intervals[0].bars_in_motion, 2);
    }

    #[test]
    fn test_move_then_fatal_error() {
        let intervals = run(vec![
            transition(TransitionKind::MoveStart, 0),
            transition(TransitionKind::FatalError, 5),
            transition(TransitionKind::InitializeStart, 60),
        ]);

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].status, OperationalState::Moving);
        assert_eq!(intervals[0].end, t(5));
        assert_eq!(intervals[1].status, OperationalState::Error);
        assert_eq!(intervals[1].begin, t(5));
    }

    #[test]
    fn test_repeated_fatal_error_does_not_spam() {
        let intervals = run(vec![
            transition(TransitionKind::MoveStart, 0),
            transition(TransitionKind::FatalError, 5),
            transition(TransitionKind::FatalError, 6),
            transition(TransitionKind::FatalError, 7),
            transition(TransitionKind::InitializeStart, 60),
        ]);

        let statuses: Vec<_> = intervals.iter().map(|i| i.status).collect();
        assert_eq!(statuses, vec![OperationalState::Moving, OperationalState::Error]);
        assert_eq!(intervals[1].begin, t(5));
        assert_eq!(intervals[1].end, t(60));
    }

    #[test]
    fn test_accel_update_lands_in_next_interval() {
        let intervals = run(vec![
            transition(TransitionKind::MoveStart, 0),
            accel(AccelAxis::X, 0.25, 1),
            accel(AccelAxis::Y, -0.5, 1),
            transition(TransitionKind::MoveComplete, 2),
            transition(TransitionKind::SetupStart, 10),
        ]);

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].x_accel, None);
        assert_eq!(intervals[0].y_accel, None);
        assert_eq!(intervals[0].accel_age, None);

        assert_eq!(intervals[1].status, OperationalState::Idle);
        assert_eq!(intervals[1].x_accel, Some(0.25));
        assert_eq!(intervals[1].y_accel, Some(-0.5));
        assert_eq!(intervals[1].accel_age, Some(TimeDelta::seconds(1)));
    }

    #[test]
    fn test_bar_activity_outside_motion_is_dropped() {
        let intervals = run(vec![
            accel(AccelAxis::X, 0.0, 0),
            bar_moving(12, 1),
            transition(TransitionKind::SetupStart, 2),
            bar_moving(5, 3),
            transition(TransitionKind::SetupComplete, 4),
        ]);

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].status, OperationalState::Idle);
        assert_eq!(intervals[0].bars_in_motion, 0);
        assert_eq!(intervals[1].status, OperationalState::Setup);
        assert_eq!(intervals[1].bars_in_motion, 1);
    }

    #[test]
    fn test_bar_targets_are_not_motion() {
        let intervals = run(vec![
            transition(TransitionKind::SetupStart, 0),
            Signal::Bar { bar: 1, activity: BarActivity::Target(10.0), at: t(1) },
            Signal::Bar { bar: 2, activity: BarActivity::Target(12.0), at: t(1) },
            Signal::Bar { bar: 3, activity: BarActivity::Target(14.5), at: t(1) },
            transition(TransitionKind::SetupComplete, 2),
        ]);

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].status, OperationalState::Setup);
        assert_eq!(intervals[0].bars_in_motion, 0);
    }

    #[test]
    fn test_bar_counter_resets_on_entry() {
        let intervals = run(vec![
            transition(TransitionKind::SetupStart, 0),
            bar_moving(1, 1),
            bar_moving(2, 1),
            Signal::Bar { bar: 4, activity: BarActivity::Target(12.0), at: t(1) },
            transition(TransitionKind::MoveStart, 2),
            bar_moving(9, 3),
            transition(TransitionKind::MoveComplete, 4),
        ]);

        assert_eq!(intervals[0].status, OperationalState::Setup);
        assert_eq!(intervals[0].bars_in_motion, 2);
        assert_eq!(intervals[1].status, OperationalState::Moving);
        assert_eq!(intervals[1].bars_in_motion, 1);
    }

    #[test]
    fn test_seed_from_accel_emits_idle() {
        let intervals = run(vec![
            accel(AccelAxis::Y, 1.0, 0),
            transition(TransitionKind::MoveStart, 5),
        ]);

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].status, OperationalState::Idle);
        assert_eq!(intervals[0].begin, t(0));
        assert_eq!(intervals[0].end, t(5));
    }

    #[test]
    fn test_invalid_first_transition_seeds_idle() {
        let mut tracker = StatusTracker::new("test.log");
        assert!(tracker.process(transition(TransitionKind::MoveComplete, 0)).is_none());
        assert_eq!(tracker.state(), Some(OperationalState::Idle));
    }

    #[test]
    fn test_ignored_requests_keep_contiguity() {
        let intervals = run(vec![
            transition(TransitionKind::SetupStart, 0),
            transition(TransitionKind::MoveComplete, 1),
            transition(TransitionKind::InitializeComplete, 2),
            transition(TransitionKind::MoveStart, 3),
            transition(TransitionKind::MoveComplete, 9),
            transition(TransitionKind::PowerDown, 20),
            transition(TransitionKind::InitializeStart, 30),
            transition(TransitionKind::InitializeComplete, 40),
        ]);

        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end, pair[1].begin);
        }
        let statuses: Vec<_> = intervals.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![
                OperationalState::Setup,
                OperationalState::Moving,
                OperationalState::Idle,
                OperationalState::PowerDown,
                OperationalState::Initialize,
            ]
        );
    }

    #[test]
    fn test_unrecognized_has_no_effect() {
        let mut tracker = StatusTracker::new("test.log");
        assert!(tracker.process(Signal::Unrecognized).is_none());
        assert_eq!(tracker.state(), None);
        assert!(tracker.finish().is_none());
    }

    #[test]
    fn test_finish_returns_open_state() {
        let mut tracker = StatusTracker::new("test.log");
        tracker.process(transition(TransitionKind::MoveStart, 0));
        tracker.process(bar_moving(4, 15));
        assert_eq!(tracker.state(), Some(OperationalState::Moving));

        let tail = tracker.finish().unwrap();
        assert_eq!(tail.source(), "test.log");
        assert_eq!(tail.status(), OperationalState::Moving);
        assert_eq!(tail.entered_at(), t(0));
        assert_eq!(tail.last_seen(), t(15));
        assert_eq!(tail.open_for(), TimeDelta::seconds(15));
    }

    #[test]
    fn test_trailing_state_closes_like_a_transition() {
        let mut tracker = StatusTracker::new("test.log");
        tracker.process(accel(AccelAxis::X, 0.3, 0));
        tracker.process(transition(TransitionKind::MoveStart, 1));
        tracker.process(bar_moving(8, 2));
        tracker.process(transition(TransitionKind::FatalError, 5));

        let tail = tracker.finish().unwrap();
        assert_eq!(tail.status(), OperationalState::Error);

        let interval = tail.close_at(t(65));
        assert_eq!(interval.status, OperationalState::Error);
        assert_eq!(interval.begin, t(5));
        assert_eq!(interval.end, t(65));
        assert_eq!(interval.duration, TimeDelta::seconds(60));
        assert_eq!(interval.x_accel, Some(0.3));
        assert_eq!(interval.accel_age, Some(TimeDelta::seconds(5)));
        assert_eq!(interval.bars_in_motion, 0);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let signals = vec![
            accel(AccelAxis::X, 0.1, 0),
            transition(TransitionKind::SetupStart, 1),
            bar_moving(2, 2),
            transition(TransitionKind::MoveStart, 3),
            transition(TransitionKind::FatalError, 4),
            transition(TransitionKind::InitializeStart, 5),
            transition(TransitionKind::InitializeComplete, 6),
        ];

        assert_eq!(run(signals.clone()), run(signals));
    }
}
