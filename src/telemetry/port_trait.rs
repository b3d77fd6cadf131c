//! Trait abstraction for telemetry lookups to enable testing

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;

/// Source of rotator angle samples for a given time
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetryPort: Send + Sync {
    /// Rotator angle in degrees at (or just after) `at`
    async fn rotator_angle(&self, at: NaiveDateTime) -> Result<f64>;
}
