//! Run statistics shared between workers.
//!
//! The completion list and the error list are the only state workers
//! mutate together; both live in [`SharedContext`]. Byte and time totals stay
//! inside each worker and are merged by the dispatcher after the worker has
//! finished.

use crate::units::{auto_convert_unit, size_delta_text};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A source file the run is finished with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRecord {
    pub path: PathBuf,
    pub elapsed: Duration,
}

impl CompletionRecord {
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.as_secs()
    }
}

/// A failure captured at a job boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordedError {
    /// Source file the failure belongs to, if any
    pub path: Option<PathBuf>,
    pub message: String,
}

impl RecordedError {
    pub fn new(path: Option<&Path>, message: impl Into<String>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RecordedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Keeps the first occurrence of every item, in order.
pub fn dedupe_stable<T: Clone + Eq + Hash>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert((*item).clone()))
        .cloned()
        .collect()
}

/// Completion and error lists shared by every worker of a run.
#[derive(Debug, Default)]
pub struct SharedContext {
    completed: Mutex<Vec<CompletionRecord>>,
    errors: Mutex<Vec<RecordedError>>,
}

impl SharedContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn complete(&self, path: &Path, elapsed: Duration) {
        self.completed.lock().push(CompletionRecord {
            path: path.to_path_buf(),
            elapsed,
        });
    }

    pub fn record_error(&self, error: RecordedError) {
        self.errors.lock().push(error);
    }

    /// Completion records in the order they were appended.
    pub fn completed(&self) -> Vec<CompletionRecord> {
        self.completed.lock().clone()
    }

    /// Errors with duplicates removed, first occurrence wins.
    pub fn errors(&self) -> Vec<RecordedError> {
        dedupe_stable(&self.errors.lock())
    }
}

/// Byte and time totals for committed jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub original_bytes: u64,
    pub new_bytes: u64,
    pub session_duration: Duration,
}

impl RunTotals {
    pub fn merge(&mut self, other: &RunTotals) {
        self.original_bytes += other.original_bytes;
        self.new_bytes += other.new_bytes;
        self.session_duration += other.session_duration;
    }
}

/// How many jobs ended which way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    /// Output accepted and moved into place
    pub committed: u32,
    /// Encode finished but missed the savings threshold
    pub discarded: u32,
    /// Encoder failure or an error at the job boundary
    pub failed: u32,
    /// Stopped early by the abort policy
    pub aborted: u32,
    /// Not encoded (dry run)
    pub skipped: u32,
}

impl OutcomeCounts {
    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.committed += other.committed;
        self.discarded += other.discarded;
        self.failed += other.failed;
        self.aborted += other.aborted;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> u32 {
        self.committed + self.discarded + self.failed + self.aborted + self.skipped
    }
}

/// What a worker hands back when its queue is drained.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerResult {
    pub queue: String,
    pub totals: RunTotals,
    pub outcomes: OutcomeCounts,
}

/// Aggregated result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub totals: RunTotals,
    pub outcomes: OutcomeCounts,
    pub completed: Vec<CompletionRecord>,
    pub errors: Vec<RecordedError>,
}

impl RunSummary {
    /// Paths of every completion record, for rewriting the queue file.
    pub fn completed_paths(&self) -> HashSet<PathBuf> {
        self.completed.iter().map(|r| r.path.clone()).collect()
    }

    pub fn merge_worker(&mut self, result: &WorkerResult) {
        self.totals.merge(&result.totals);
        self.outcomes.merge(&result.outcomes);
    }

    /// One-paragraph human summary printed after the completion report.
    pub fn summary_lines(&self) -> Vec<String> {
        let o = &self.outcomes;
        vec![
            format!(
                "{} committed, {} discarded, {} aborted, {} failed, {} skipped",
                o.committed, o.discarded, o.aborted, o.failed, o.skipped
            ),
            format!(
                "{} -> {} ({}) in {}",
                auto_convert_unit(self.totals.original_bytes),
                auto_convert_unit(self.totals.new_bytes),
                size_delta_text(self.totals.original_bytes, self.totals.new_bytes),
                format_duration(self.totals.session_duration)
            ),
        ]
    }
}

/// `(  3m 07s)`
fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("({:>3}m {:02}s)", secs / 60, secs % 60)
}

/// Completion list with paths right-aligned to the longest one.
pub fn format_completion_report(records: &[CompletionRecord]) -> Vec<String> {
    let width = records
        .iter()
        .map(|r| r.path.to_string_lossy().chars().count())
        .max()
        .unwrap_or(0);

    records
        .iter()
        .map(|r| {
            format!(
                "{:>width$}  {}",
                r.path.to_string_lossy(),
                format_duration(r.elapsed),
                width = width
            )
        })
        .collect()
}
