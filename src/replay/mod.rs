//! # Replay Module
//!
//! Drives the per-file replay and the corpus-wide merge.
//!
//! This module handles:
//! - Reading log files and qualifying year-less timestamps
//! - Running each file through the classifier and status tracker
//! - Annotating intervals with rotator telemetry at their boundaries
//! - Replaying files concurrently and merging them chronologically
//! - Closing each file's trailing state at the start of the next file
//! - Running the failure pass on the merged history

pub mod corpus;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::csu::classifier::classify;
use crate::csu::failure::{classify_failures_with_open, merge_chronologically};
use crate::csu::interval::Interval;
use crate::csu::tracker::{StatusTracker, TrailingState};
use crate::error::{CsuReplayError, Result};
use crate::telemetry::{Correlator, TelemetrySample};

/// Result of replaying one log file
#[derive(Debug, Clone, PartialEq)]
pub struct FileReplay {
    /// Intervals closed within the file, annotated with telemetry
    pub intervals: Vec<Interval>,
    /// Timestamp of the first classified signal
    pub first_signal: Option<NaiveDateTime>,
    /// State still open when the file ended
    pub tail: Option<TrailingState>,
}

/// Replay the lines of one log file
///
/// Lines must already carry full timestamps (see [`corpus::YearQualifier`]).
/// Each emitted interval is annotated with telemetry at `begin` and `end`;
/// the sample taken at one interval's end is reused for the next interval's
/// begin.
pub async fn replay_lines<I, S>(source: &str, lines: I, correlator: &Correlator) -> FileReplay
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tracker = StatusTracker::new(source);
    let mut intervals = Vec::new();
    let mut first_signal = None;
    let mut last_end: Option<(NaiveDateTime, TelemetrySample)> = None;

    for line in lines {
        let signal = classify(line.as_ref());
        if let Some(at) = signal.timestamp() {
            first_signal.get_or_insert(at);
        }

        let Some(mut interval) = tracker.process(signal) else {
            continue;
        };

        let begin = match last_end {
            Some((at, sample)) if at == interval.begin => sample,
            _ => correlator.sample(interval.begin).await,
        };
        let end = correlator.sample(interval.end).await;
        annotate(&mut interval, begin, end);
        last_end = Some((interval.end, end));

        intervals.push(interval);
    }

    FileReplay {
        intervals,
        first_signal,
        tail: tracker.finish(),
    }
}

fn annotate(interval: &mut Interval, begin: TelemetrySample, end: TelemetrySample) {
    interval.rotposn_begin = begin.rotposn;
    interval.near_wrap_limit = begin.near_wrap_limit;
    interval.rotposn_end = end.rotposn;
}

/// Read and replay a single log file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid UTF-8
pub async fn replay_file(path: &Path, correlator: &Correlator) -> Result<FileReplay> {
    let bytes = tokio::fs::read(path).await?;
    let contents = String::from_utf8(bytes).map_err(|_| CsuReplayError::Encoding(path.to_path_buf()))?;

    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let year = corpus::infer_year(path);
    if year.is_none() {
        debug!("{}: no year in file name, year-less lines will be ignored", source);
    }

    let mut years = corpus::YearQualifier::new(year);
    let lines: Box<dyn Iterator<Item = std::borrow::Cow<'_, str>> + Send + '_> =
        Box::new(contents.lines().map(|line| years.qualify(line)));
    let replay = replay_lines(&source, lines, correlator).await;

    info!("{}: {} intervals", source, replay.intervals.len());
    Ok(replay)
}

/// Close each file's trailing state at the first signal of the next log file
///
/// The next file is the one whose first signal is the earliest at or after
/// the trailing file's last signal. Trailing states without a next file stay
/// open and are returned in chronological order.
async fn close_rollovers(
    files: Vec<FileReplay>,
    correlator: &Correlator,
) -> (Vec<Vec<Interval>>, Vec<TrailingState>) {
    let starts: Vec<(usize, NaiveDateTime)> = files
        .iter()
        .enumerate()
        .filter_map(|(i, file)| file.first_signal.map(|at| (i, at)))
        .collect();

    let mut per_file = Vec::with_capacity(files.len());
    let mut open = Vec::new();

    for (i, file) in files.into_iter().enumerate() {
        let mut intervals = file.intervals;

        if let Some(tail) = file.tail {
            let next_start = starts
                .iter()
                .filter(|(j, at)| *j != i && *at >= tail.last_seen())
                .map(|(_, at)| *at)
                .min();

            match next_start {
                Some(end) => {
                    debug!(
                        "{}: closing trailing {} at next log start {}",
                        tail.source(),
                        tail.status(),
                        end
                    );
                    let mut interval = tail.close_at(end);
                    let begin_sample = correlator.sample(interval.begin).await;
                    let end_sample = correlator.sample(interval.end).await;
                    annotate(&mut interval, begin_sample, end_sample);
                    intervals.push(interval);
                }
                None => open.push(tail),
            }
        }

        per_file.push(intervals);
    }

    open.sort_by(|a, b| {
        a.entered_at()
            .cmp(&b.entered_at())
            .then_with(|| a.source().cmp(b.source()))
    });
    (per_file, open)
}

/// Replay a set of log files and return the classified, merged history
///
/// Files are replayed concurrently, at most `max_parallel` at a time.
/// Unreadable files are skipped with a warning. Once every file has been
/// replayed, trailing states are closed across file boundaries, the
/// intervals are merged chronologically and the failure pass runs over the
/// whole history. States still open at the end of the corpus take part in
/// the failure pass but are not returned.
pub async fn replay_corpus(paths: Vec<PathBuf>, correlator: Correlator, max_parallel: usize) -> Vec<Interval> {
    let total = paths.len();
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut tasks = JoinSet::new();

    for path in paths {
        let permits = Arc::clone(&permits);
        let correlator = correlator.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let result = replay_file(&path, &correlator).await;
            (path, result)
        });
    }

    let mut files = Vec::with_capacity(total);
    let mut skipped = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(replay))) => files.push(replay),
            Ok((path, Err(e))) => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped += 1;
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!("Replay task cancelled: {}", e);
                skipped += 1;
            }
        }
    }

    let (per_file, open) = close_rollovers(files, &correlator).await;
    let mut history = merge_chronologically(per_file);
    let failed = classify_failures_with_open(&mut history, &open);
    for tail in &open {
        debug!("{}: {} still open at end of corpus", tail.source(), tail.status());
    }

    info!(
        "Replayed {} of {} files: {} intervals, {} failed moves",
        total - skipped,
        total,
        history.len(),
        failed
    );
    history
}
