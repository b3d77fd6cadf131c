//! # gshow Telemetry Port
//!
//! Looks up archived keyword history by running the observatory `gshow`
//! command:
//!
//! ```text
//! gshow -s dcs1 ROTPOSN -window 1s -csv -date 2019-03-01T10:00:00
//! ```
//!
//! The reply is a CSV table with `#` comment lines; the first row carrying a
//! numeric value in the keyword column is used.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::process::Command;
use tracing::trace;

use super::port_trait::TelemetryPort;
use crate::config::TelemetryConfig;
use crate::error::{CsuReplayError, Result};

/// Date format expected by `gshow -date`
const GSHOW_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Telemetry port backed by the `gshow` keyword history command
#[derive(Debug, Clone)]
pub struct GshowPort {
    /// Program followed by any leading arguments (e.g. `ssh host gshow`)
    command: Vec<String>,
    server: String,
    keyword: String,
    window: Duration,
    timeout: Duration,
}

impl GshowPort {
    /// Creates a port from telemetry configuration
    ///
    /// `command` is split on whitespace so wrappers such as
    /// `ssh observer@host gshow` work unchanged.
    ///
    /// # Errors
    ///
    /// Returns error if the command is empty
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        let command: Vec<String> = config.command.split_whitespace().map(str::to_string).collect();
        if command.is_empty() {
            return Err(CsuReplayError::Telemetry("telemetry command is empty".to_string()));
        }

        Ok(Self {
            command,
            server: config.server.clone(),
            keyword: config.keyword.clone(),
            window: Duration::from_secs(config.window_s),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Full argument list passed after the program name
    fn args(&self, at: NaiveDateTime) -> Vec<String> {
        let mut args: Vec<String> = self.command[1..].to_vec();
        args.extend([
            "-s".to_string(),
            self.server.clone(),
            self.keyword.clone(),
            "-window".to_string(),
            format!("{}s", self.window.as_secs()),
            "-csv".to_string(),
            "-date".to_string(),
            at.format(GSHOW_DATE_FORMAT).to_string(),
        ]);
        args
    }
}

#[async_trait]
impl TelemetryPort for GshowPort {
    async fn rotator_angle(&self, at: NaiveDateTime) -> Result<f64> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(self.args(at))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        trace!("Querying {} at {}", self.keyword, at);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CsuReplayError::TelemetryTimeout(self.timeout))??;

        if !output.status.success() {
            return Err(CsuReplayError::Telemetry(format!(
                "{} exited with {}: {}",
                self.command[0],
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_keyword_csv(&String::from_utf8_lossy(&output.stdout), &self.keyword)
    }
}

/// Extract the first numeric value of `keyword` from a gshow CSV reply
///
/// # Errors
///
/// Returns error if the reply has no such column or no numeric value in it
///
/// # Examples
///
/// ```
/// use csu_replay::telemetry::gshow::parse_keyword_csv;
///
/// let reply = "# dcs1 history\nDate,ROTMODE,ROTPOSN,EL\n2019-03-01T10:00:00,PA,183.25,45.0\n";
/// assert_eq!(parse_keyword_csv(reply, "ROTPOSN").unwrap(), 183.25);
/// ```
pub fn parse_keyword_csv(reply: &str, keyword: &str) -> Result<f64> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reply.as_bytes());

    let column = reader
        .headers()?
        .iter()
        .position(|header| header.eq_ignore_ascii_case(keyword))
        .ok_or_else(|| CsuReplayError::Telemetry(format!("no {} column in reply", keyword)))?;

    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(column).and_then(|field| field.parse::<f64>().ok()) {
            return Ok(value);
        }
    }

    Err(CsuReplayError::Telemetry(format!("no {} sample in reply", keyword)))
}
