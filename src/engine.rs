//! Batch runner shared by all tasks.

use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::config::EngineConfig;
use crate::executor::{Action, BatchTally, Executor, Outcome, SkipReason};
use crate::oplog::{Callbacks, OperationLog, Progress, ProgressSink};

/// Final tally of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub tally: BatchTally,
    /// The batch stopped early because the cancel flag was set.
    pub cancelled: bool,
}

/// Identifier-driven file matching and reconciliation engine.
///
/// Processes one batch at a time, one item at a time.
/// The cancel flag is checked between items, never during a file operation.
pub struct MediaEngine {
    config: EngineConfig,
    executor: Executor,
    log: RefCell<OperationLog>,
    progress: ProgressSink,
    cancel: Arc<AtomicBool>,
}

impl MediaEngine {
    /// Create an engine and open its operation log.
    pub fn new(config: EngineConfig, callbacks: Callbacks) -> Result<Self> {
        let config = config.normalized();
        let (notify, progress) = callbacks.into_parts();
        let log = OperationLog::open(&config.log_path(), notify)?;
        Ok(Self {
            executor: Executor::new(config.dryrun, config.delete_permanently),
            config,
            log: RefCell::new(log),
            progress,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Use an externally owned cancel flag, for example one set from a Ctrl+C handler.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The most recent lines recorded to the operation log.
    #[must_use]
    pub fn log_entries(&self) -> Vec<String> {
        self.log.borrow().entries().map(ToString::to_string).collect()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub(crate) const fn is_dryrun(&self) -> bool {
        self.executor.is_dryrun()
    }

    /// Write a line to the log file and the notification sink.
    pub(crate) fn record(&self, message: &str) {
        self.log.borrow_mut().record(message);
    }

    /// Send a line to the notification sink only.
    pub(crate) fn notify(&self, message: &str) {
        self.log.borrow().notify(message);
    }

    /// Run `step` for every item, reporting progress and stopping early on cancellation.
    ///
    /// The summary line is written after the last item so it reflects the final tally.
    pub(crate) fn run_batch<T>(
        &self,
        label: &str,
        items: &[T],
        mut step: impl FnMut(&T, &mut BatchTally),
    ) -> BatchReport {
        let mut tally = BatchTally::default();
        let mut progress = Progress::new(items.len());
        let mut cancelled = false;

        self.notify(&format!("[{label}] {} items", items.len()));
        for item in items {
            if self.is_cancelled() {
                cancelled = true;
                break;
            }
            step(item, &mut tally);
            (self.progress)(progress.advance());
        }
        if items.is_empty() {
            (self.progress)(progress.percent());
        }

        let mut summary = format!("[{label}] summary: {}", tally.summary());
        if cancelled {
            summary.push_str(" (cancelled)");
        }
        self.record(&summary);
        BatchReport { tally, cancelled }
    }

    /// Apply one action, count its outcome and log it.
    ///
    /// Failures are logged and counted, never propagated.
    pub(crate) fn apply(&self, action: &Action, tally: &mut BatchTally) -> Option<Outcome> {
        let result = self.executor.apply(action);
        tally.record(&result);
        match result {
            Ok(outcome) => {
                match outcome {
                    Outcome::Applied => self.record(&action.to_string()),
                    Outcome::Planned => self.record(&format!("[dryrun] {action}")),
                    Outcome::Skipped(reason) => self.notify(&format!("skip ({reason}): {action}")),
                }
                Some(outcome)
            }
            Err(error) => {
                self.record(&format!("error: {error}"));
                None
            }
        }
    }

    /// Count and report an item that produced no action.
    pub(crate) fn skip(&self, tally: &mut BatchTally, reason: SkipReason, path: &Path) {
        tally.record_skip(reason);
        self.notify(&format!("skip ({reason}): {}", path.display()));
    }

    /// Count and log a failure that happened outside the executor.
    pub(crate) fn fail(&self, tally: &mut BatchTally, message: &str) {
        tally.record_failure();
        self.record(&format!("error: {message}"));
    }
}

impl std::fmt::Debug for MediaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaEngine")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Fail the batch early when a root directory is missing.
pub(crate) fn ensure_directory(path: &Path, description: &str) -> Result<()> {
    if !path.is_dir() {
        anyhow::bail!("{description} is not a directory: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod engine_tests {
    use super::*;

    use std::fs;
    use std::sync::Mutex;

    use tempfile::tempdir;

    fn config_in(dir: &Path) -> EngineConfig {
        EngineConfig {
            log_dir: dir.join("logs"),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn batch_reports_progress_and_summary() {
        let dir = tempdir().expect("tempdir");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let engine = MediaEngine::new(
            config_in(dir.path()),
            Callbacks::new().on_progress(move |value| sink.lock().expect("lock").push(value)),
        )
        .expect("engine");

        let report = engine.run_batch("test", &[1, 2, 3, 4], |item, tally| {
            if item % 2 == 0 {
                tally.record_applied(false);
            } else {
                tally.record_skip(SkipReason::NoIdentifier);
            }
        });

        assert_eq!(report.tally.applied, 2);
        assert_eq!(report.tally.skipped, 2);
        assert!(!report.cancelled);
        assert_eq!(*seen.lock().expect("lock"), vec![25, 50, 75, 100]);
        let entries = engine.log_entries();
        assert_eq!(
            entries.last().map(String::as_str),
            Some("[test] summary: applied 2, planned 0, skipped 2, failed 0 (no-identifier 2)")
        );
        let log = fs::read_to_string(dir.path().join("logs/operations.log")).expect("read log");
        assert!(log.contains("[test] summary: applied 2"));
    }

    #[test]
    fn cancelled_batch_stops_between_items() {
        let dir = tempdir().expect("tempdir");
        let engine = MediaEngine::new(config_in(dir.path()), Callbacks::default()).expect("engine");
        let cancel = engine.cancel_flag();

        let report = engine.run_batch("test", &[1, 2, 3], |item, tally| {
            tally.record_applied(false);
            if *item == 2 {
                cancel.store(true, Ordering::SeqCst);
            }
        });
        assert!(report.cancelled);
        assert_eq!(report.tally.applied, 2);
        assert!(engine.log_entries().last().is_some_and(|line| line.ends_with("(cancelled)")));
    }

    #[test]
    fn failed_action_is_counted_not_propagated() {
        let dir = tempdir().expect("tempdir");
        let engine = MediaEngine::new(config_in(dir.path()), Callbacks::default()).expect("engine");
        let mut tally = BatchTally::default();
        let outcome = engine.apply(
            &Action::Copy {
                source: dir.path().join("missing.jpg"),
                destination: dir.path().join("out.jpg"),
                guard: crate::executor::Guard::Always,
            },
            &mut tally,
        );
        assert!(outcome.is_none());
        assert_eq!(tally.failed, 1);
        assert!(engine.log_entries().iter().any(|line| line.starts_with("error:")));
    }

    #[test]
    fn empty_batch_reports_full_progress() {
        let dir = tempdir().expect("tempdir");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let engine = MediaEngine::new(
            config_in(dir.path()),
            Callbacks::new().on_progress(move |value| sink.lock().expect("lock").push(value)),
        )
        .expect("engine");
        let items: [u8; 0] = [];
        let report = engine.run_batch("empty", &items, |_, _| {});
        assert_eq!(report.tally.total(), 0);
        assert_eq!(*seen.lock().expect("lock"), vec![100]);
    }
}
