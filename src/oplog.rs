//! Operation log and caller callbacks.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

/// First line of a newly created log file.
pub const LOG_HEADER: &str = "--- media-tools operation log ---";

/// Number of recorded lines kept in memory.
pub const RECENT_ENTRIES: usize = 256;

pub type NotifySink = Box<dyn Fn(&str) + Send>;
pub type ProgressSink = Box<dyn Fn(u8) + Send>;

/// Notification and progress sinks supplied by the caller.
///
/// Both default to no-ops. Sinks are called synchronously and must return quickly.
pub struct Callbacks {
    notify: NotifySink,
    progress: ProgressSink,
}

/// Append-only log of what the engine did.
///
/// Every recorded line goes to the notification sink and to the log file.
pub struct OperationLog {
    writer: BufWriter<File>,
    path: PathBuf,
    notify: NotifySink,
    recent: VecDeque<String>,
}

/// Integer percentage of processed items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    total: usize,
    done: usize,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            notify: Box::new(|_| {}),
            progress: Box::new(|_| {}),
        }
    }
}

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_notify(mut self, notify: impl Fn(&str) + Send + 'static) -> Self {
        self.notify = Box::new(notify);
        self
    }

    #[must_use]
    pub fn on_progress(mut self, progress: impl Fn(u8) + Send + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub(crate) fn into_parts(self) -> (NotifySink, ProgressSink) {
        (self.notify, self.progress)
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

impl OperationLog {
    /// Open the log file for appending, creating it and its directory if needed.
    pub fn open(path: &Path, notify: NotifySink) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }

        let is_new = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "{LOG_HEADER}").context("Failed to write log header")?;
            writer.flush().context("Failed to write log header")?;
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            notify,
            recent: VecDeque::with_capacity(RECENT_ENTRIES),
        })
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Append a timestamped line to the log file and forward it to the notification sink.
    pub fn record(&mut self, message: &str) {
        (self.notify)(message);
        let _ = writeln!(self.writer, "[{}] {message}", Self::timestamp());
        let _ = self.writer.flush();
        if self.recent.len() == RECENT_ENTRIES {
            self.recent.pop_front();
        }
        self.recent.push_back(message.to_string());
    }

    /// Forward a status line to the notification sink only.
    pub fn notify(&self, message: &str) {
        (self.notify)(message);
    }

    /// The most recent lines recorded by this instance, oldest first.
    /// The log file keeps everything.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationLog")
            .field("path", &self.path)
            .field("recent", &self.recent.len())
            .finish_non_exhaustive()
    }
}

impl Progress {
    #[must_use]
    pub const fn new(total: usize) -> Self {
        Self { total, done: 0 }
    }

    /// Mark one more item done and return the new percentage.
    pub fn advance(&mut self) -> u8 {
        self.done = (self.done + 1).min(self.total);
        self.percent()
    }

    #[must_use]
    pub const fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.done * 100 / self.total) as u8
    }
}

#[cfg(test)]
mod oplog_tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use tempfile::tempdir;

    #[test]
    fn new_log_file_gets_header_and_timestamped_lines() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("logs/operations.log");
        let mut log = OperationLog::open(&path, Box::new(|_| {})).expect("open log");
        log.record("[covers] summary: applied 1");
        drop(log);

        let content = fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], LOG_HEADER);
        assert!(lines[1].starts_with('['));
        assert_eq!(lines[1].find(']'), Some(20));
        assert!(lines[1].ends_with("] [covers] summary: applied 1"));
    }

    #[test]
    fn existing_log_is_appended_without_second_header() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("operations.log");
        OperationLog::open(&path, Box::new(|_| {})).expect("open log").record("first");
        OperationLog::open(&path, Box::new(|_| {})).expect("open log").record("second");

        let content = fs::read_to_string(&path).expect("read log");
        assert_eq!(content.matches(LOG_HEADER).count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn records_are_forwarded_to_sink() {
        let dir = tempdir().expect("tempdir");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let mut log = OperationLog::open(
            &dir.path().join("operations.log"),
            Box::new(move |message| sink.lock().expect("lock").push(message.to_string())),
        )
        .expect("open log");

        log.record("copied");
        log.notify("only shown");
        assert_eq!(*received.lock().expect("lock"), vec!["copied", "only shown"]);
        assert_eq!(log.entries().collect::<Vec<_>>(), vec!["copied"]);
    }

    #[test]
    fn only_recent_entries_are_kept_in_memory() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("operations.log");
        let mut log = OperationLog::open(&path, Box::new(|_| {})).expect("open log");
        for number in 0..RECENT_ENTRIES + 10 {
            log.record(&format!("line {number}"));
        }

        let entries: Vec<&str> = log.entries().collect();
        assert_eq!(entries.len(), RECENT_ENTRIES);
        assert_eq!(entries.first(), Some(&"line 10"));
        drop(log);
        let content = fs::read_to_string(&path).expect("read log");
        assert_eq!(content.lines().count(), RECENT_ENTRIES + 11);
    }

    #[test]
    fn progress_percentages() {
        let mut progress = Progress::new(3);
        assert_eq!(progress.percent(), 0);
        assert_eq!(progress.advance(), 33);
        assert_eq!(progress.advance(), 66);
        assert_eq!(progress.advance(), 100);
        assert_eq!(progress.advance(), 100);
        assert_eq!(Progress::new(0).percent(), 100);
    }
}
