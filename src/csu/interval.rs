//! # Interval Record
//!
//! One contiguous span during which the CSU held a single operational state.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use super::protocol::OperationalState;

/// A closed span of CSU history
///
/// Emitted by the status tracker when the state is left. Only
/// `move_failed` changes afterwards, set by the failure pass once all files
/// are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Log file the interval was reconstructed from
    pub source: String,

    /// State being exited
    pub status: OperationalState,

    pub begin: NaiveDateTime,

    /// Timestamp of the transition that closed the interval
    pub end: NaiveDateTime,

    /// `end - begin`
    #[serde(with = "seconds")]
    pub duration: TimeDelta,

    /// Last known X accelerometer reading at `begin`
    pub x_accel: Option<f64>,

    /// Last known Y accelerometer reading at `begin`
    pub y_accel: Option<f64>,

    /// Age of the accelerometer readings at `begin`
    #[serde(with = "optional_seconds")]
    pub accel_age: Option<TimeDelta>,

    /// Rotator angle at `begin` (degrees)
    pub rotposn_begin: Option<f64>,

    /// Rotator angle at `end` (degrees)
    pub rotposn_end: Option<f64>,

    /// Rotator near a cable-wrap boundary at `begin`
    pub near_wrap_limit: bool,

    /// Distinct bars reported moving during a `Moving` or `Setup` interval
    pub bars_in_motion: u32,

    /// Move ended in a fatal error (only meaningful for `Moving`)
    pub move_failed: bool,
}

impl Interval {
    /// Whether this is a move interval that ended in a fatal error
    #[must_use]
    pub fn is_failed_move(&self) -> bool {
        self.status == OperationalState::Moving && self.move_failed
    }
}

/// Durations are stored in tables as floating point seconds
pub(crate) mod seconds {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_seconds(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        from_seconds(secs).ok_or_else(|| serde::de::Error::custom(format!("invalid duration {}", secs)))
    }

    pub fn to_seconds(value: TimeDelta) -> f64 {
        value.num_milliseconds() as f64 / 1000.0
    }

    pub fn from_seconds(secs: f64) -> Option<TimeDelta> {
        if !secs.is_finite() {
            return None;
        }
        TimeDelta::try_milliseconds((secs * 1000.0).round() as i64)
    }
}

pub(crate) mod optional_seconds {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(delta) => serializer.serialize_some(&super::seconds::to_seconds(*delta)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TimeDelta>, D::Error> {
        match Option::<f64>::deserialize(deserializer)? {
            Some(secs) => super::seconds::from_seconds(secs)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid duration {}", secs))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_conversion() {
        assert_eq!(seconds::to_seconds(TimeDelta::milliseconds(1500)), 1.5);
        assert_eq!(seconds::from_seconds(2.25), Some(TimeDelta::milliseconds(2250)));
        assert_eq!(seconds::from_seconds(f64::NAN), None);
    }

    #[test]
    fn test_is_failed_move() {
        let at = NaiveDateTime::parse_from_str("2019-03-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let mut interval = Interval {
            source: "190301.log".to_string(),
            status: OperationalState::Moving,
            begin: at,
            end: at,
            duration: TimeDelta::zero(),
            x_accel: None,
            y_accel: None,
            accel_age: None,
            rotposn_begin: None,
            rotposn_end: None,
            near_wrap_limit: false,
            bars_in_motion: 0,
            move_failed: true,
        };
        assert!(interval.is_failed_move());

        interval.status = OperationalState::Idle;
        assert!(!interval.is_failed_move());
    }
}
