//! Directory tree enumeration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::normalize_extension;
use crate::identifier::{self, CanonicalId};

type NameFilter = Box<dyn Fn(&str) -> bool + Send>;

/// Snapshot of a file taken at scan time.
///
/// Not re-validated afterwards: the file may have changed by the time it is acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub name: String,
    pub stem: String,
    /// Lowercase, without the leading dot.
    pub extension: String,
    pub size: u64,
    pub parent_name: String,
}

/// Lazy file enumerator with extension and name filters.
#[derive(Default)]
pub struct TreeScanner {
    recursive: bool,
    extensions: Vec<String>,
    name_filter: Option<NameFilter>,
}

impl FileRecord {
    /// Read a record for an existing file.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self::with_size(path.to_path_buf(), metadata.len()))
    }

    fn with_size(path: PathBuf, size: u64) -> Self {
        let name = crate::path_to_filename_string(&path);
        let stem = crate::path_to_file_stem_string(&path);
        let extension = crate::path_to_file_extension_string(&path);
        let parent_name = path.parent().map(crate::path_to_filename_string).unwrap_or_default();
        Self {
            path,
            name,
            stem,
            extension,
            size,
            parent_name,
        }
    }

    /// Canonical identifier of the file name, if it has one.
    #[must_use]
    pub fn canonical_id(&self) -> Option<CanonicalId> {
        identifier::extract(&self.name)
    }
}

impl TreeScanner {
    /// Scanner for the files directly inside a root, accepting any extension.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Only accept these extensions. An empty list accepts everything.
    #[must_use]
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|extension| normalize_extension(extension.as_ref()))
            .collect();
        self
    }

    /// Only accept file names for which the predicate returns true.
    #[must_use]
    pub fn name_filter(mut self, filter: impl Fn(&str) -> bool + Send + 'static) -> Self {
        self.name_filter = Some(Box::new(filter));
        self
    }

    /// Enumerate matching files under `root`, sorted by file name within each directory.
    ///
    /// Symbolic links are followed. Entries that cannot be read, dangling links and link loops
    /// are skipped, the walk continues past them. A missing root yields nothing.
    pub fn scan(&self, root: &Path) -> impl Iterator<Item = FileRecord> + '_ {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        WalkDir::new(root)
            .follow_links(true)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.record_for(&entry))
    }

    fn record_for(&self, entry: &DirEntry) -> Option<FileRecord> {
        let extension = crate::path_to_file_extension_string(entry.path());
        if !self.extensions.is_empty() && !self.extensions.contains(&extension) {
            return None;
        }
        if let Some(filter) = &self.name_filter
            && !filter(&crate::os_str_to_string(entry.file_name()))
        {
            return None;
        }
        let size = entry.metadata().ok()?.len();
        Some(FileRecord::with_size(entry.path().to_path_buf(), size))
    }
}

impl std::fmt::Debug for TreeScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeScanner")
            .field("recursive", &self.recursive)
            .field("extensions", &self.extensions)
            .field("name_filter", &self.name_filter.is_some())
            .finish()
    }
}

/// Immediate subdirectories of `root`, sorted by name.
pub fn child_directories(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut directories: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|file_type| file_type.is_dir()))
        .map(|entry| entry.path())
        .collect();
    directories.sort();
    Ok(directories)
}
