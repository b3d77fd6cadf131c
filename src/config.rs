//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CsuReplayError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub telemetry: TelemetryConfig,
    pub output: OutputConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

/// Log corpus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_max_parallel_files")]
    pub max_parallel_files: usize,
}

/// Telemetry lookup configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_command")]
    pub command: String,

    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_keyword")]
    pub keyword: String,

    #[serde(default = "default_window_s")]
    pub window_s: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_wrap_tolerance_deg")]
    pub wrap_tolerance_deg: f64,
}

/// Interval table configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_table_path")]
    pub table_path: PathBuf,

    #[serde(default = "default_table_format")]
    pub format: String,

    #[serde(default = "default_reuse_existing")]
    pub reuse_existing: bool,
}

/// Reliability report configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_prompt_failure_threshold_s")]
    pub prompt_failure_threshold_s: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write logs to this file when set
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_log_dir() -> PathBuf { PathBuf::from("/s/sdata1300/logs/gui/eavesdrop") }
fn default_extension() -> String { "log".to_string() }
fn default_max_parallel_files() -> usize { 4 }

fn default_telemetry_enabled() -> bool { true }
fn default_command() -> String { "gshow".to_string() }
fn default_server() -> String { "dcs1".to_string() }
fn default_keyword() -> String { "ROTPOSN".to_string() }
fn default_window_s() -> u64 { 1 }
fn default_timeout_ms() -> u64 { 5000 }
fn default_wrap_tolerance_deg() -> f64 { 10.0 }

fn default_table_path() -> PathBuf { PathBuf::from("csu_intervals.csv") }
fn default_table_format() -> String { "csv".to_string() }
fn default_reuse_existing() -> bool { true }

fn default_prompt_failure_threshold_s() -> u64 { 120 }

fn default_log_level() -> String { "info".to_string() }

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            extension: default_extension(),
            max_parallel_files: default_max_parallel_files(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            command: default_command(),
            server: default_server(),
            keyword: default_keyword(),
            window_s: default_window_s(),
            timeout_ms: default_timeout_ms(),
            wrap_tolerance_deg: default_wrap_tolerance_deg(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            table_path: default_table_path(),
            format: default_table_format(),
            reuse_existing: default_reuse_existing(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            prompt_failure_threshold_s: default_prompt_failure_threshold_s(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use csu_replay::config::Config;
    ///
    /// let config = Config::load("config/csu_replay.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.corpus.extension.is_empty() {
            return Err(invalid("corpus extension cannot be empty"));
        }

        if self.corpus.max_parallel_files == 0 || self.corpus.max_parallel_files > 256 {
            return Err(invalid("max_parallel_files must be between 1 and 256"));
        }

        // Command and keyword only matter when lookups happen
        if self.telemetry.enabled {
            if self.telemetry.command.trim().is_empty() {
                return Err(invalid("telemetry command cannot be empty when enabled"));
            }
            if self.telemetry.keyword.is_empty() {
                return Err(invalid("telemetry keyword cannot be empty when enabled"));
            }
        }

        if self.telemetry.window_s == 0 || self.telemetry.window_s > 3600 {
            return Err(invalid("window_s must be between 1 and 3600"));
        }

        if self.telemetry.timeout_ms == 0 || self.telemetry.timeout_ms > 60000 {
            return Err(invalid("timeout_ms must be between 1 and 60000"));
        }

        if !(self.telemetry.wrap_tolerance_deg > 0.0 && self.telemetry.wrap_tolerance_deg < 90.0) {
            return Err(invalid("wrap_tolerance_deg must be greater than 0.0 and less than 90.0"));
        }

        if self.output.table_path.as_os_str().is_empty() {
            return Err(invalid("output table_path cannot be empty"));
        }

        if !["csv", "jsonl"].contains(&self.output.format.as_str()) {
            return Err(invalid("output format must be one of: csv, jsonl"));
        }

        if self.report.prompt_failure_threshold_s == 0 {
            return Err(invalid("prompt_failure_threshold_s must be greater than 0"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> CsuReplayError {
    CsuReplayError::Config(toml::de::Error::custom(msg))
}
