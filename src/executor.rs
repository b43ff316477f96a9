//! Guarded filesystem actions and per-batch outcome tallies.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Condition checked against the live filesystem right before an action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Overwrite whatever is at the destination.
    Always,
    /// Only if nothing exists at the destination.
    DestinationAbsent,
    /// Only if the destination is missing or strictly smaller than the source.
    SourceLarger,
    /// Only if the destination is missing or has the same byte size as the source.
    SameSize,
}

/// A single filesystem effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Copy {
        source: PathBuf,
        destination: PathBuf,
        guard: Guard,
    },
    Move {
        source: PathBuf,
        destination: PathBuf,
        guard: Guard,
    },
    Rename {
        source: PathBuf,
        destination: PathBuf,
        guard: Guard,
    },
    /// Remove `path` once `confirmed_by`, the write that supersedes it, exists.
    Delete { path: PathBuf, confirmed_by: PathBuf },
}

/// Why an action was not performed. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    NoIdentifier,
    NoCandidate,
    DestinationExists,
    NotLarger,
    SizeMismatch,
    Collision,
    Unchanged,
    NoMetadata,
    ToolMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Dry run: the action would have been applied.
    Planned,
    Skipped(SkipReason),
}

/// Failure of a single item. Never aborts the batch.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("Failed to {operation} {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Refusing to delete {} before {} exists", .path.display(), .confirmation.display())]
    UnconfirmedDelete { path: PathBuf, confirmation: PathBuf },

    #[error("External tool not found: {0}")]
    ExternalToolMissing(String),

    #[error("External tool failed for {}: {message}", .path.display())]
    ExternalToolFailed { path: PathBuf, message: String },

    #[error("Failed to move {} to trash: {message}", .path.display())]
    Trash { path: PathBuf, message: String },

    #[error("Invalid mapping row {row}: {message}")]
    Mapping { row: usize, message: String },
}

/// Running count of action outcomes for one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchTally {
    pub applied: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub skip_reasons: BTreeMap<SkipReason, usize>,
}

/// Applies actions, or only plans them in dry-run mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor {
    dryrun: bool,
    delete_permanently: bool,
}

impl Action {
    /// The path the action changes last: destination for writes, the removed path for deletes.
    #[must_use]
    pub fn target(&self) -> &Path {
        match self {
            Self::Copy { destination, .. } | Self::Move { destination, .. } | Self::Rename { destination, .. } => {
                destination
            }
            Self::Delete { path, .. } => path,
        }
    }

    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
            Self::Rename { .. } => "rename",
            Self::Delete { .. } => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy {
                source, destination, ..
            }
            | Self::Move {
                source, destination, ..
            }
            | Self::Rename {
                source, destination, ..
            } => write!(f, "{} {} -> {}", self.verb(), source.display(), destination.display()),
            Self::Delete { path, .. } => write!(f, "delete {}", path.display()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoIdentifier => "no-identifier",
            Self::NoCandidate => "no-candidate",
            Self::DestinationExists => "destination-exists",
            Self::NotLarger => "not-larger",
            Self::SizeMismatch => "size-mismatch",
            Self::Collision => "collision",
            Self::Unchanged => "unchanged",
            Self::NoMetadata => "no-metadata",
            Self::ToolMissing => "tool-missing",
        };
        write!(f, "{name}")
    }
}

impl ItemError {
    fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl BatchTally {
    pub fn record(&mut self, result: &Result<Outcome, ItemError>) {
        match result {
            Ok(Outcome::Applied) => self.applied += 1,
            Ok(Outcome::Planned) => self.planned += 1,
            Ok(Outcome::Skipped(reason)) => self.record_skip(*reason),
            Err(_) => self.failed += 1,
        }
    }

    pub fn record_skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        *self.skip_reasons.entry(reason).or_default() += 1;
    }

    pub const fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub const fn record_applied(&mut self, dryrun: bool) {
        if dryrun {
            self.planned += 1;
        } else {
            self.applied += 1;
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied + self.planned + self.skipped + self.failed
    }

    #[must_use]
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skip_reasons.get(&reason).copied().unwrap_or_default()
    }

    /// One-line human-readable tally.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "applied {}, planned {}, skipped {}, failed {}",
            self.applied, self.planned, self.skipped, self.failed
        );
        if !self.skip_reasons.is_empty() {
            let reasons: Vec<String> = self
                .skip_reasons
                .iter()
                .map(|(reason, count)| format!("{reason} {count}"))
                .collect();
            summary.push_str(&format!(" ({})", reasons.join(", ")));
        }
        summary
    }
}

impl std::ops::AddAssign<&BatchTally> for BatchTally {
    fn add_assign(&mut self, other: &Self) {
        self.applied += other.applied;
        self.planned += other.planned;
        self.skipped += other.skipped;
        self.failed += other.failed;
        for (reason, count) in &other.skip_reasons {
            *self.skip_reasons.entry(*reason).or_default() += count;
        }
    }
}

impl Executor {
    #[must_use]
    pub const fn new(dryrun: bool, delete_permanently: bool) -> Self {
        Self {
            dryrun,
            delete_permanently,
        }
    }

    #[must_use]
    pub const fn is_dryrun(&self) -> bool {
        self.dryrun
    }

    /// Apply a single action.
    ///
    /// The guard is evaluated against the filesystem immediately before the effect.
    /// A source is only ever removed after its destination write succeeded.
    pub fn apply(&self, action: &Action) -> Result<Outcome, ItemError> {
        match action {
            Action::Copy {
                source,
                destination,
                guard,
            } => self.transfer(source, destination, *guard, Transfer::Copy),
            Action::Move {
                source,
                destination,
                guard,
            } => self.transfer(source, destination, *guard, Transfer::Move),
            Action::Rename {
                source,
                destination,
                guard,
            } => self.transfer(source, destination, *guard, Transfer::Rename),
            Action::Delete { path, confirmed_by } => self.delete(path, confirmed_by),
        }
    }

    fn transfer(&self, source: &Path, destination: &Path, guard: Guard, kind: Transfer) -> Result<Outcome, ItemError> {
        let source_metadata = match fs::metadata(source) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(ItemError::SourceMissing(source.to_path_buf()));
            }
            Err(error) => return Err(ItemError::io("read", source, error)),
        };
        if source == destination {
            return Ok(Outcome::Skipped(SkipReason::Unchanged));
        }
        if let Some(reason) = check_guard(guard, source_metadata.len(), destination, kind) {
            return Ok(Outcome::Skipped(reason));
        }
        if self.dryrun {
            return Ok(Outcome::Planned);
        }

        if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| ItemError::io("create directory", parent, error))?;
        }

        match kind {
            Transfer::Copy => copy_file(source, destination)?,
            Transfer::Move | Transfer::Rename => move_path(source, destination, source_metadata.is_dir())?,
        }
        Ok(Outcome::Applied)
    }

    fn delete(&self, path: &Path, confirmed_by: &Path) -> Result<Outcome, ItemError> {
        if !path.exists() {
            return Err(ItemError::SourceMissing(path.to_path_buf()));
        }
        if self.dryrun {
            return Ok(Outcome::Planned);
        }
        if !confirmed_by.exists() {
            return Err(ItemError::UnconfirmedDelete {
                path: path.to_path_buf(),
                confirmation: confirmed_by.to_path_buf(),
            });
        }
        if self.delete_permanently {
            fs::remove_file(path).map_err(|error| ItemError::io("delete", path, error))?;
        } else {
            trash::delete(path).map_err(|error| ItemError::Trash {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;
        }
        Ok(Outcome::Applied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Copy,
    Move,
    Rename,
}

fn check_guard(guard: Guard, source_size: u64, destination: &Path, kind: Transfer) -> Option<SkipReason> {
    let Ok(existing) = fs::metadata(destination) else {
        return None;
    };
    match guard {
        Guard::Always => None,
        Guard::DestinationAbsent if kind == Transfer::Rename => Some(SkipReason::Collision),
        Guard::DestinationAbsent => Some(SkipReason::DestinationExists),
        Guard::SourceLarger => (source_size <= existing.len()).then_some(SkipReason::NotLarger),
        Guard::SameSize => (source_size != existing.len()).then_some(SkipReason::SizeMismatch),
    }
}

/// Copy through a temporary sibling so an interrupted copy never leaves a truncated destination.
fn copy_file(source: &Path, destination: &Path) -> Result<(), ItemError> {
    let partial = partial_path(destination);
    if let Err(error) = fs::copy(source, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(ItemError::io("copy", source, error));
    }
    fs::rename(&partial, destination).map_err(|error| {
        let _ = fs::remove_file(&partial);
        ItemError::io("replace", destination, error)
    })
}

fn move_path(source: &Path, destination: &Path, is_dir: bool) -> Result<(), ItemError> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::CrossesDevices => {
            if is_dir {
                copy_dir(source, destination)?;
                fs::remove_dir_all(source).map_err(|error| ItemError::io("remove", source, error))
            } else {
                copy_file(source, destination)?;
                fs::remove_file(source).map_err(|error| ItemError::io("remove", source, error))
            }
        }
        Err(error) => Err(ItemError::io("move", source, error)),
    }
}

fn copy_dir(source: &Path, destination: &Path) -> Result<(), ItemError> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|error| ItemError::io("read", source, io::Error::other(error)))?;
        let relative = entry.path().strip_prefix(source).unwrap_or_else(|_| entry.path());
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|error| ItemError::io("create directory", &target, error))?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn partial_path(destination: &Path) -> PathBuf {
    let name = crate::path_to_filename_string(destination);
    destination.with_file_name(format!(".{name}.partial"))
}
