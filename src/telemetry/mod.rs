//! # Telemetry Module
//!
//! Correlates CSU state changes with the rotator angle recorded by the
//! telescope control system.
//!
//! This module handles:
//! - The [`TelemetryPort`] abstraction over keyword history lookups
//! - The `gshow` command implementation of that port
//! - Classifying angles near the cable-wrap boundaries
//! - Degrading failed or disabled lookups to an "unknown" sample

pub mod gshow;
pub mod port_trait;

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

pub use port_trait::TelemetryPort;

use crate::config::TelemetryConfig;
use crate::error::Result;

/// Default half-width of the hazardous band around each wrap boundary (degrees)
pub const DEFAULT_WRAP_TOLERANCE_DEG: f64 = 10.0;

/// Rotator angles at which the cable wrap is mechanically hazardous
pub const WRAP_BOUNDARIES_DEG: [f64; 5] = [-360.0, -180.0, 0.0, 180.0, 360.0];

/// Rotator state at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySample {
    /// Rotator angle in degrees, `None` when unknown
    pub rotposn: Option<f64>,
    /// Angle lies within the tolerance of a wrap boundary
    pub near_wrap_limit: bool,
}

impl TelemetrySample {
    /// The sentinel used when no sample is available
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Whether `angle` lies strictly within `tolerance` degrees of a wrap boundary
///
/// # Examples
///
/// ```
/// use csu_replay::telemetry::{near_wrap_limit, DEFAULT_WRAP_TOLERANCE_DEG};
///
/// assert!(near_wrap_limit(-175.0, DEFAULT_WRAP_TOLERANCE_DEG));
/// assert!(near_wrap_limit(3.5, DEFAULT_WRAP_TOLERANCE_DEG));
/// assert!(!near_wrap_limit(90.0, DEFAULT_WRAP_TOLERANCE_DEG));
/// ```
#[must_use]
pub fn near_wrap_limit(angle: f64, tolerance: f64) -> bool {
    WRAP_BOUNDARIES_DEG
        .iter()
        .any(|boundary| (angle - boundary).abs() < tolerance)
}

/// Turns port lookups into samples, never failing
///
/// A disabled correlator returns [`TelemetrySample::unknown`] without
/// touching the port.
#[derive(Clone)]
pub struct Correlator {
    port: Option<Arc<dyn TelemetryPort>>,
    wrap_tolerance: f64,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("enabled", &self.is_enabled())
            .field("wrap_tolerance", &self.wrap_tolerance)
            .finish_non_exhaustive()
    }
}

impl Correlator {
    /// Creates a correlator that queries `port`
    #[must_use]
    pub fn new(port: Arc<dyn TelemetryPort>, wrap_tolerance: f64) -> Self {
        Self {
            port: Some(port),
            wrap_tolerance,
        }
    }

    /// Creates a correlator that never performs lookups
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            port: None,
            wrap_tolerance: DEFAULT_WRAP_TOLERANCE_DEG,
        }
    }

    /// Builds the correlator described by configuration, using `gshow`
    ///
    /// # Errors
    ///
    /// Returns error if telemetry is enabled but the command is unusable
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let port = gshow::GshowPort::from_config(config)?;
        Ok(Self::new(Arc::new(port), config.wrap_tolerance_deg))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.port.is_some()
    }

    /// Rotator sample at `at`, or the unknown sentinel on any failure
    pub async fn sample(&self, at: NaiveDateTime) -> TelemetrySample {
        let Some(port) = &self.port else {
            return TelemetrySample::unknown();
        };

        match port.rotator_angle(at).await {
            Ok(angle) if angle.is_finite() => TelemetrySample {
                rotposn: Some(angle),
                near_wrap_limit: near_wrap_limit(angle, self.wrap_tolerance),
            },
            Ok(angle) => {
                debug!("Discarding non-finite rotator angle {} at {}", angle, at);
                TelemetrySample::unknown()
            }
            Err(e) => {
                debug!("Telemetry unavailable at {}: {}", at, e);
                TelemetrySample::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::port_trait::mocks::{FailingTelemetry, FixedTableTelemetry};
    use super::port_trait::MockTelemetryPort;
    use super::*;

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2019-03-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
            + chrono::TimeDelta::seconds(secs)
    }

    #[test]
    fn test_wrap_boundaries() {
        for boundary in WRAP_BOUNDARIES_DEG {
            assert!(near_wrap_limit(boundary, DEFAULT_WRAP_TOLERANCE_DEG));
            assert!(near_wrap_limit(boundary + 9.9, DEFAULT_WRAP_TOLERANCE_DEG));
            assert!(near_wrap_limit(boundary - 9.9, DEFAULT_WRAP_TOLERANCE_DEG));
        }
    }

    #[test]
    fn test_wrap_tolerance_is_exclusive() {
        assert!(!near_wrap_limit(10.0, DEFAULT_WRAP_TOLERANCE_DEG));
        assert!(!near_wrap_limit(-190.0, DEFAULT_WRAP_TOLERANCE_DEG));
        assert!(!near_wrap_limit(270.0, DEFAULT_WRAP_TOLERANCE_DEG));
        assert!(!near_wrap_limit(45.0, DEFAULT_WRAP_TOLERANCE_DEG));
    }

    #[test]
    fn test_custom_tolerance() {
        assert!(near_wrap_limit(195.0, 20.0));
        assert!(!near_wrap_limit(195.0, 5.0));
    }

    #[tokio::test]
    async fn test_sample_from_port() {
        let port = Arc::new(FixedTableTelemetry::new([(at(0), 178.0), (at(100), 45.0)]));
        let correlator = Correlator::new(port.clone(), DEFAULT_WRAP_TOLERANCE_DEG);

        let first = correlator.sample(at(50)).await;
        assert_eq!(first.rotposn, Some(178.0));
        assert!(first.near_wrap_limit);

        let second = correlator.sample(at(100)).await;
        assert_eq!(second.rotposn, Some(45.0));
        assert!(!second.near_wrap_limit);

        assert_eq!(port.call_count(), 2);
    }

    #[tokio::test]
    async fn test_port_failure_degrades_to_unknown() {
        let correlator = Correlator::new(Arc::new(FailingTelemetry), DEFAULT_WRAP_TOLERANCE_DEG);
        assert_eq!(correlator.sample(at(0)).await, TelemetrySample::unknown());
    }

    #[tokio::test]
    async fn test_non_finite_angle_degrades_to_unknown() {
        let mut mock = MockTelemetryPort::new();
        mock.expect_rotator_angle().returning(|_| Ok(f64::NAN));
        let correlator = Correlator::new(Arc::new(mock), DEFAULT_WRAP_TOLERANCE_DEG);

        let sample = correlator.sample(at(0)).await;
        assert_eq!(sample.rotposn, None);
        assert!(!sample.near_wrap_limit);
    }

    #[tokio::test]
    async fn test_disabled_correlator_never_calls_port() {
        let correlator = Correlator::disabled();
        assert!(!correlator.is_enabled());
        assert_eq!(correlator.sample(at(0)).await, TelemetrySample::unknown());
    }

    #[test]
    fn test_disabled_config_short_circuits() {
        let config = TelemetryConfig {
            enabled: false,
            command: String::new(),
            ..TelemetryConfig::default()
        };
        let correlator = Correlator::from_config(&config).unwrap();
        assert!(!correlator.is_enabled());
    }

    #[test]
    fn test_mock_expectations_are_checked() {
        let mut mock = MockTelemetryPort::new();
        mock.expect_rotator_angle().times(1).returning(|_| Ok(-3.0));
        let correlator = Correlator::new(Arc::new(mock), DEFAULT_WRAP_TOLERANCE_DEG);

        let sample = tokio_test::block_on(correlator.sample(at(0)));
        assert_eq!(sample.rotposn, Some(-3.0));
        assert!(sample.near_wrap_limit);
    }
}
