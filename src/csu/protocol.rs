//! # CSU Log Vocabulary and Types
//!
//! Property names, status values and the signal/state types shared by the
//! classifier and the status tracker.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Overall CSU status property
pub const PROP_STATUS: &str = "CSUStatus";

/// X axis accelerometer property
pub const PROP_X_ACCEL: &str = "CSUXAccelerometer";

/// Y axis accelerometer property
pub const PROP_Y_ACCEL: &str = "CSUYAccelerometer";

/// Mask name property, assigned when a mask setup begins
pub const PROP_SETUP_MASK_NAME: &str = "CSUSetupMaskName";

/// Per-bar target position property prefix (followed by a two digit bar number)
pub const PROP_BAR_TARGET_PREFIX: &str = "CSUBarTargetPosition";

/// Per-bar status property prefix (followed by a two digit bar number)
pub const PROP_BAR_STATUS_PREFIX: &str = "CSUBarStatus";

/// Lowest bar number
pub const BAR_MIN: u8 = 1;

/// Highest bar number (46 slits, two bars each)
pub const BAR_MAX: u8 = 92;

/// Bar status value reported while a bar is in motion
pub const BAR_STATUS_MOVING: &str = "Moving";

/// `CSUStatus` values and the transition each one requests.
///
/// Matched in order against the trimmed value as a case-insensitive prefix;
/// longer prefixes that share a stem with a shorter one must come first.
pub const STATUS_VALUES: &[(&str, TransitionKind)] = &[
    ("FATAL ERROR", TransitionKind::FatalError),
    ("Setup complete", TransitionKind::SetupComplete),
    ("Move complete", TransitionKind::MoveComplete),
    ("Moving", TransitionKind::MoveStart),
    ("Initialization complete", TransitionKind::InitializeComplete),
    ("Initializing", TransitionKind::InitializeStart),
    ("Shutting down", TransitionKind::PowerDown),
    ("Powering down", TransitionKind::PowerDown),
    ("Powered down", TransitionKind::PowerDown),
];

/// Discrete operational state of the CSU
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationalState {
    Idle,
    Setup,
    Moving,
    Error,
    PowerDown,
    Initialize,
}

/// Kind of state change requested by a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    SetupStart,
    SetupComplete,
    MoveStart,
    MoveComplete,
    FatalError,
    PowerDown,
    InitializeStart,
    InitializeComplete,
}

/// Accelerometer axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccelAxis {
    X,
    Y,
}

/// What a per-bar property line says about the bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarActivity {
    /// Target position assigned during mask setup (mm)
    Target(f64),
    /// Bar reported as moving
    Moving,
}

/// A classified event extracted from one log line
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Request to change the CSU operational state
    Transition { kind: TransitionKind, at: NaiveDateTime },
    /// New accelerometer reading
    Accel { axis: AccelAxis, value: f64, at: NaiveDateTime },
    /// Per-bar setup target or motion status
    Bar { bar: u8, activity: BarActivity, at: NaiveDateTime },
    /// Line carries nothing relevant to CSU status
    Unrecognized,
}

impl Signal {
    /// Timestamp of the signal, `None` for [`Signal::Unrecognized`]
    #[must_use]
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Signal::Transition { at, .. } | Signal::Accel { at, .. } | Signal::Bar { at, .. } => {
                Some(*at)
            }
            Signal::Unrecognized => None,
        }
    }
}

impl OperationalState {
    /// State reached from `self` when `kind` is requested.
    ///
    /// Returns `None` when the request has no edge from the current state,
    /// including "any state" edges that would re-enter the current state.
    ///
    /// # Examples
    ///
    /// ```
    /// use csu_replay::csu::protocol::{OperationalState, TransitionKind};
    ///
    /// let next = OperationalState::Idle.transition(TransitionKind::MoveStart);
    /// assert_eq!(next, Some(OperationalState::Moving));
    ///
    /// // A second fatal error while already in Error is ignored
    /// assert_eq!(OperationalState::Error.transition(TransitionKind::FatalError), None);
    /// ```
    #[must_use]
    pub fn transition(self, kind: TransitionKind) -> Option<OperationalState> {
        let next = match (self, kind) {
            (_, TransitionKind::FatalError) => OperationalState::Error,
            (_, TransitionKind::PowerDown) => OperationalState::PowerDown,
            (_, TransitionKind::InitializeStart) => OperationalState::Initialize,
            (OperationalState::Idle, TransitionKind::SetupStart) => OperationalState::Setup,
            (OperationalState::Setup, TransitionKind::SetupComplete) => OperationalState::Idle,
            (OperationalState::Idle | OperationalState::Setup, TransitionKind::MoveStart) => {
                OperationalState::Moving
            }
            (OperationalState::Moving, TransitionKind::MoveComplete) => OperationalState::Idle,
            (OperationalState::Initialize, TransitionKind::InitializeComplete) => OperationalState::Idle,
            _ => return None,
        };

        (next != self).then_some(next)
    }

    /// Whether per-bar activity is counted while in this state
    #[must_use]
    pub fn counts_bars(self) -> bool {
        matches!(self, OperationalState::Moving | OperationalState::Setup)
    }
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationalState::Idle => "Idle",
            OperationalState::Setup => "Setup",
            OperationalState::Moving => "Moving",
            OperationalState::Error => "Error",
            OperationalState::PowerDown => "PowerDown",
            OperationalState::Initialize => "Initialize",
        };
        f.write_str(name)
    }
}

/// Look up the transition requested by a `CSUStatus` value
#[must_use]
pub fn status_transition(value: &str) -> Option<TransitionKind> {
    let value = value.trim();
    STATUS_VALUES.iter().find_map(|(prefix, kind)| {
        value
            .get(..prefix.len())
            .filter(|head| head.eq_ignore_ascii_case(prefix))
            .map(|_| *kind)
    })
}
