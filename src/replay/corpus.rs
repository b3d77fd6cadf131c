//! # Log Corpus Discovery
//!
//! Finds eavesdrop log files and resolves the year that older, year-less
//! log formats leave out of their timestamps.
//!
//! Older files write `MM-DD HH:MM:SS,mmm`; the year is taken from the file
//! name (`150312.log`, `20190301.log`, `2019-03-01.log`) or from a
//! four-digit parent directory (`2016/0312.log`), and prefixed to each line
//! before classification. A file that runs past the end of December moves
//! on to the next year when its month jumps back.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::Result;

/// Year-less timestamp at the start of a line
static SHORT_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}-\d{2} \d{2}:\d{2}:\d{2},").expect("Invalid timestamp regex"));

/// Suffixes of compressed or archived logs that are not replayed
const SKIPPED_SUFFIXES: &[&str] = &[".Z", ".gz", ".bz2", ".tar", ".tgz", ".zip"];

/// Plausible range of four-digit years
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1990..=2099;

/// A backward month jump larger than this is read as a new year
const YEAR_WRAP_MONTHS: u32 = 6;

/// Find log files under `dir` with the given extension, sorted by path
///
/// Searches one level of subdirectories as well, so per-year directories are
/// picked up.
///
/// # Errors
///
/// Returns error if `dir` cannot be read
pub fn discover_logs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut logs = Vec::new();
    collect_logs(dir, extension, 1, &mut logs)?;
    logs.sort();
    debug!("Found {} log files under {}", logs.len(), dir.display());
    Ok(logs)
}

fn collect_logs(dir: &Path, extension: &str, depth: usize, logs: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            if depth > 0 {
                collect_logs(&path, extension, depth - 1, logs)?;
            }
            continue;
        }

        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if SKIPPED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            info!("Skipping archived log {}", path.display());
            continue;
        }

        if path.extension().is_some_and(|ext| ext == extension) {
            logs.push(path);
        }
    }

    Ok(())
}

/// Infer the year a log file was written from its name or parent directory
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use csu_replay::replay::corpus::infer_year;
///
/// assert_eq!(infer_year(Path::new("/logs/150312.log")), Some(2015));
/// assert_eq!(infer_year(Path::new("/logs/20190301.log")), Some(2019));
/// assert_eq!(infer_year(Path::new("/logs/2016/0312.log")), Some(2016));
/// assert_eq!(infer_year(Path::new("/logs/eavesdrop.log")), None);
/// ```
#[must_use]
pub fn infer_year(path: &Path) -> Option<i32> {
    let from_stem = path
        .file_stem()
        .and_then(|stem| year_from_digits(&leading_digits(&stem.to_string_lossy())));

    from_stem.or_else(|| {
        path.parent()
            .and_then(Path::file_name)
            .map(|dir| dir.to_string_lossy().into_owned())
            .filter(|dir| dir.len() == 4)
            .and_then(|dir| dir.parse::<i32>().ok())
            .filter(|year| YEAR_RANGE.contains(year))
    })
}

fn leading_digits(s: &str) -> String {
    s.chars().take_while(char::is_ascii_digit).collect()
}

fn year_from_digits(digits: &str) -> Option<i32> {
    match digits.len() {
        4 | 8 => digits[..4].parse().ok().filter(|year| YEAR_RANGE.contains(year)),
        2 | 6 => digits[..2].parse::<i32>().ok().map(|yy| 2000 + yy),
        _ => None,
    }
}

/// Prefix a year-less timestamp with `year`
///
/// Lines that already carry a full date, or that do not start with a
/// timestamp, are returned unchanged.
#[must_use]
pub fn qualify_line(line: &str, year: Option<i32>) -> Cow<'_, str> {
    match year {
        Some(year) if SHORT_TIMESTAMP.is_match(line) => Cow::Owned(format!("{:04}-{}", year, line)),
        _ => Cow::Borrowed(line),
    }
}

/// Qualifies the year-less lines of one file in order
///
/// Starts at the year inferred for the file and advances it when the month
/// jumps back by more than six (December to January). Smaller backward jumps
/// are treated as out-of-order lines and keep the year.
#[derive(Debug, Clone)]
pub struct YearQualifier {
    year: Option<i32>,
    last_month: Option<u32>,
}

impl YearQualifier {
    #[must_use]
    pub fn new(year: Option<i32>) -> Self {
        Self { year, last_month: None }
    }

    /// Year that will be applied to the next year-less line
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn qualify<'a>(&mut self, line: &'a str) -> Cow<'a, str> {
        let Some(year) = self.year else {
            return Cow::Borrowed(line);
        };
        if !SHORT_TIMESTAMP.is_match(line) {
            return Cow::Borrowed(line);
        }

        if let Ok(month) = line[..2].parse::<u32>() {
            if self.last_month.is_some_and(|last| last > month + YEAR_WRAP_MONTHS) {
                debug!("Month went from {:?} to {}, advancing to {}", self.last_month, month, year + 1);
                self.year = Some(year + 1);
            }
            self.last_month = Some(month);
        }

        qualify_line(line, self.year)
    }
}
