//! # Interval Table
//!
//! Persists the classified interval history so multi-year corpora need not
//! be re-parsed on every run.
//!
//! Two formats are supported:
//! - `csv`: one row per interval with a header; unknown values are empty cells
//! - `jsonl`: one JSON object per line
//!
//! Durations are written as seconds.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use tracing::info;

use crate::csu::interval::Interval;
use crate::error::{CsuReplayError, Result};

/// On-disk layout of the interval table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    JsonLines,
}

impl FromStr for TableFormat {
    type Err = CsuReplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(TableFormat::Csv),
            "jsonl" => Ok(TableFormat::JsonLines),
            other => Err(CsuReplayError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Write `intervals` to `path`, replacing any existing file
///
/// # Errors
///
/// Returns error if the file cannot be created or written
pub fn write_table(path: &Path, format: TableFormat, intervals: &[Interval]) -> Result<()> {
    let file = File::create(path)?;

    match format {
        TableFormat::Csv => {
            let mut writer = csv::Writer::from_writer(file);
            for interval in intervals {
                writer.serialize(interval)?;
            }
            writer.flush()?;
        }
        TableFormat::JsonLines => {
            let mut writer = BufWriter::new(file);
            for interval in intervals {
                serde_json::to_writer(&mut writer, interval)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
    }

    info!("Wrote {} intervals to {}", intervals.len(), path.display());
    Ok(())
}

/// Read an interval table previously written by [`write_table`]
///
/// # Errors
///
/// Returns error if the file cannot be read or a row is malformed
pub fn read_table(path: &Path, format: TableFormat) -> Result<Vec<Interval>> {
    let file = File::open(path)?;

    let intervals = match format {
        TableFormat::Csv => csv::Reader::from_reader(file)
            .deserialize()
            .collect::<std::result::Result<Vec<Interval>, _>>()?,
        TableFormat::JsonLines => {
            let mut intervals = Vec::new();
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                intervals.push(serde_json::from_str(&line)?);
            }
            intervals
        }
    };

    info!("Read {} intervals from {}", intervals.len(), path.display());
    Ok(intervals)
}
