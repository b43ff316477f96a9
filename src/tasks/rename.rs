use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::engine::{BatchReport, MediaEngine, ensure_directory};
use crate::executor::{Action, BatchTally, Guard, Outcome, SkipReason};
use crate::identifier;
use crate::scanner::{self, FileRecord, TreeScanner};

/// Release tag appended to folder names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FolderTag {
    /// Subtitled release: `-C`
    #[value(name = "c")]
    Subtitled,
    /// 4K release: `-4K`, also added to the files inside
    #[value(name = "4k")]
    UltraHd,
}

const KNOWN_FOLDER_TAGS: [&str; 2] = ["-C", "-4K"];

impl FolderTag {
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Subtitled => "-C",
            Self::UltraHd => "-4K",
        }
    }
}

impl MediaEngine {
    /// Rename videos directly inside `directory` to `<ID><suffix>.<ext>`.
    ///
    /// Videos that already carry the suffix right after their identifier or at the end of the name are left alone.
    pub fn rename_videos_with_suffix(&self, directory: &Path, suffix: &str) -> Result<BatchReport> {
        ensure_directory(directory, "Video directory")?;
        let videos: Vec<FileRecord> = TreeScanner::new()
            .extensions(&self.config().video_extensions)
            .scan(directory)
            .collect();

        Ok(self.run_batch("video rename", &videos, |video, tally| {
            if has_suffix(&video.stem, suffix) {
                self.skip(tally, SkipReason::Unchanged, &video.path);
                return;
            }
            let Some(id) = video.canonical_id() else {
                self.skip(tally, SkipReason::NoIdentifier, &video.path);
                return;
            };
            let new_name = format!("{id}{suffix}{}", crate::dotted_extension(&video.path));
            self.rename_file(&video.path, &new_name, tally);
        }))
    }

    /// Append the tag to every folder directly inside `directory` that does not carry a release tag yet.
    ///
    /// For 4K, files inside a renamed folder also get `-4K` right after their identifier.
    pub fn tag_folders(&self, directory: &Path, tag: FolderTag) -> Result<BatchReport> {
        ensure_directory(directory, "Folder root")?;
        let folders = scanner::child_directories(directory)
            .with_context(|| format!("Failed to list folders in {}", directory.display()))?;

        Ok(self.run_batch("folder tag", &folders, |folder, tally| {
            let name = crate::path_to_filename_string(folder);
            let upper = name.to_uppercase();
            if KNOWN_FOLDER_TAGS.iter().any(|known| upper.ends_with(known)) {
                self.skip(tally, SkipReason::Unchanged, folder);
                return;
            }
            let renamed = folder.with_file_name(format!("{name}{}", tag.suffix()));
            let outcome = self.apply(
                &Action::Rename {
                    source: folder.clone(),
                    destination: renamed.clone(),
                    guard: Guard::DestinationAbsent,
                },
                tally,
            );
            if tag != FolderTag::UltraHd {
                return;
            }
            let current: PathBuf = match outcome {
                Some(Outcome::Applied) => renamed,
                Some(Outcome::Planned) => folder.clone(),
                _ => return,
            };
            for file in TreeScanner::new().scan(&current) {
                if file.stem.contains(tag.suffix()) {
                    continue;
                }
                let new_name = format!(
                    "{}{}",
                    identifier::insert_after_id(&file.stem, tag.suffix()),
                    crate::dotted_extension(&file.path)
                );
                self.rename_file(&file.path, &new_name, tally);
            }
        }))
    }

    fn rename_file(&self, path: &Path, new_name: &str, tally: &mut BatchTally) {
        if crate::path_to_filename_string(path) == new_name {
            self.skip(tally, SkipReason::Unchanged, path);
            return;
        }
        self.apply(
            &Action::Rename {
                source: path.to_path_buf(),
                destination: path.with_file_name(new_name),
                guard: Guard::DestinationAbsent,
            },
            tally,
        );
    }
}

/// True when `suffix` ends the stem or directly follows the identifier as a whole token.
///
/// The end check matters for tags like `-4K`, which would otherwise be read as part of the identifier.
fn has_suffix(stem: &str, suffix: &str) -> bool {
    if suffix.is_empty() {
        return false;
    }
    let upper_stem = stem.to_uppercase();
    let upper_suffix = suffix.to_uppercase();
    if upper_stem.ends_with(&upper_suffix) {
        return true;
    }
    identifier::locate(stem).is_some_and(|range| {
        stem[range.end..]
            .to_uppercase()
            .strip_prefix(&upper_suffix)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_alphanumeric()))
    })
}
