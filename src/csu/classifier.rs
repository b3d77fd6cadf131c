//! # Line Classifier
//!
//! Turns one raw eavesdrop log line into at most one [`Signal`].
//!
//! Only property-change lines are considered:
//!
//! ```text
//! 2019-03-01 10:00:00,123 [mosfire] DEBUG edu.ucla.astro.irlab.util.Property - Setting property <CSUStatus> to new value <Moving>.
//! ```
//!
//! The property name selects a decoding rule from an ordered table (first
//! match wins). Anything else, including lines with a malformed timestamp or
//! an undecodable value, is [`Signal::Unrecognized`].

use std::sync::LazyLock;

use chrono::{NaiveDateTime, TimeDelta};
use regex::Regex;

use super::protocol::*;

/// Anchored shape of a property-change line
static PROPERTY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}),(\d{1,9}) \[[^\]]*\] DEBUG .*?Setting property <([A-Za-z0-9]+)> to new value <(.*)>\.\s*$",
    )
    .expect("Invalid property line regex")
});

/// Decodes the value of one property into a signal
type Decoder = fn(Option<u8>, &str, NaiveDateTime) -> Option<Signal>;

/// One entry of the property table
struct PropertyRule {
    /// Property name, or name prefix for per-bar properties
    name: &'static str,
    /// Property name is followed by a two digit bar number
    per_bar: bool,
    decode: Decoder,
}

/// Property decoding rules, tried in order
const PROPERTY_RULES: &[PropertyRule] = &[
    PropertyRule { name: PROP_STATUS, per_bar: false, decode: decode_status },
    PropertyRule { name: PROP_SETUP_MASK_NAME, per_bar: false, decode: decode_mask_name },
    PropertyRule { name: PROP_X_ACCEL, per_bar: false, decode: decode_x_accel },
    PropertyRule { name: PROP_Y_ACCEL, per_bar: false, decode: decode_y_accel },
    PropertyRule { name: PROP_BAR_TARGET_PREFIX, per_bar: true, decode: decode_bar_target },
    PropertyRule { name: PROP_BAR_STATUS_PREFIX, per_bar: true, decode: decode_bar_status },
];

/// Classify a single log line
///
/// # Examples
///
/// ```
/// use csu_replay::csu::classifier::classify;
/// use csu_replay::csu::protocol::{Signal, TransitionKind};
///
/// let line = "2019-03-01 10:00:00,123 [mosfire] DEBUG edu.ucla.astro.irlab.util.Property - \
///             Setting property <CSUStatus> to new value <FATAL ERROR >.";
/// match classify(line) {
///     Signal::Transition { kind, .. } => assert_eq!(kind, TransitionKind::FatalError),
///     other => panic!("unexpected signal: {:?}", other),
/// }
///
/// assert_eq!(classify("garbage"), Signal::Unrecognized);
/// ```
#[must_use]
pub fn classify(line: &str) -> Signal {
    let Some(caps) = PROPERTY_LINE.captures(line) else {
        return Signal::Unrecognized;
    };

    let Some(at) = parse_timestamp(&caps[1], &caps[2]) else {
        return Signal::Unrecognized;
    };

    let property = &caps[3];
    let value = &caps[4];

    for rule in PROPERTY_RULES {
        if let Some(bar) = match_property(rule, property) {
            return (rule.decode)(bar, value, at).unwrap_or(Signal::Unrecognized);
        }
    }

    Signal::Unrecognized
}

/// Parse `YYYY-MM-DD HH:MM:SS` plus a decimal fraction of a second
///
/// The fraction is read as written, so `5` is half a second and `123` is
/// 123 ms.
#[must_use]
pub fn parse_timestamp(date_time: &str, fraction: &str) -> Option<NaiveDateTime> {
    let base = NaiveDateTime::parse_from_str(date_time, "%Y-%m-%d %H:%M:%S").ok()?;

    if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: i64 = fraction.parse().ok()?;
    let nanos = digits * 10_i64.pow(9 - fraction.len() as u32);

    base.checked_add_signed(TimeDelta::nanoseconds(nanos))
}

/// Match a property name against a rule, returning the bar number for per-bar rules
///
/// The outer `Option` is the match; the inner one carries the bar number.
fn match_property(rule: &PropertyRule, property: &str) -> Option<Option<u8>> {
    if !rule.per_bar {
        return (property == rule.name).then_some(None);
    }

    let index = property.strip_prefix(rule.name)?;
    if index.len() != 2 || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let bar: u8 = index.parse().ok()?;
    Some(Some(bar))
}

fn decode_status(_: Option<u8>, value: &str, at: NaiveDateTime) -> Option<Signal> {
    status_transition(value).map(|kind| Signal::Transition { kind, at })
}

fn decode_mask_name(_: Option<u8>, value: &str, at: NaiveDateTime) -> Option<Signal> {
    (!value.trim().is_empty()).then_some(Signal::Transition {
        kind: TransitionKind::SetupStart,
        at,
    })
}

fn decode_x_accel(_: Option<u8>, value: &str, at: NaiveDateTime) -> Option<Signal> {
    decode_accel(AccelAxis::X, value, at)
}

fn decode_y_accel(_: Option<u8>, value: &str, at: NaiveDateTime) -> Option<Signal> {
    decode_accel(AccelAxis::Y, value, at)
}

fn decode_accel(axis: AccelAxis, value: &str, at: NaiveDateTime) -> Option<Signal> {
    let value = parse_number(value)?;
    Some(Signal::Accel { axis, value, at })
}

fn decode_bar_target(bar: Option<u8>, value: &str, at: NaiveDateTime) -> Option<Signal> {
    let bar = valid_bar(bar)?;
    let position = parse_number(value)?;
    Some(Signal::Bar { bar, activity: BarActivity::Target(position), at })
}

fn decode_bar_status(bar: Option<u8>, value: &str, at: NaiveDateTime) -> Option<Signal> {
    let bar = valid_bar(bar)?;
    value
        .trim()
        .eq_ignore_ascii_case(BAR_STATUS_MOVING)
        .then_some(Signal::Bar { bar, activity: BarActivity::Moving, at })
}

fn valid_bar(bar: Option<u8>) -> Option<u8> {
    bar.filter(|b| (BAR_MIN..=BAR_MAX).contains(b))
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
