//! # Error Types
//!
//! Custom error types for CSU Replay using `thiserror`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for CSU Replay
#[derive(Debug, Error)]
pub enum CsuReplayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Log file is not valid text
    #[error("Log file {} is not valid UTF-8", .0.display())]
    Encoding(PathBuf),

    /// Telemetry query failed or returned nothing usable
    #[error("Telemetry unavailable: {0}")]
    Telemetry(String),

    /// Telemetry query did not answer in time
    #[error("Telemetry query timed out after {0:?}")]
    TelemetryTimeout(Duration),

    /// Interval table (de)serialization errors
    #[error("Interval table error: {0}")]
    Table(#[from] csv::Error),

    /// JSON Lines (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported interval table format
    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for CSU Replay
pub type Result<T> = std::result::Result<T, CsuReplayError>;
