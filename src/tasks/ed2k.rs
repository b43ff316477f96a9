use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Local;
use walkdir::WalkDir;

use crate::engine::{BatchReport, MediaEngine, ensure_directory};
use crate::executor::{Action, BatchTally, ItemError, SkipReason};
use crate::scanner::{FileRecord, TreeScanner};

const ED2K_PREFIX: &str = "ed2k://";
const MAX_TOOL_MESSAGE_CHARS: usize = 200;

impl MediaEngine {
    /// Collect `ed2k://` links from text files under `base_dir` into one timestamped file in `output_dir`.
    ///
    /// Every folder is handled on its own, subfolders first and `base_dir` last:
    /// archives are extracted with the external archive tool, then the text files are read.
    /// With `delete_sources`, text files are deleted once their links have been written.
    pub fn extract_ed2k(&self, base_dir: &Path, output_dir: &Path, delete_sources: bool) -> Result<BatchReport> {
        ensure_directory(base_dir, "Base directory")?;
        if !self.is_dryrun() {
            fs::create_dir_all(output_dir)
                .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
        }
        let output_file = output_dir.join(format!("ed2k_links_{}.txt", Local::now().format("%Y%m%d_%H%M%S")));

        let mut folders: Vec<PathBuf> = WalkDir::new(base_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .map(walkdir::DirEntry::into_path)
            .collect();
        folders.push(base_dir.to_path_buf());

        let mut link_count = 0;
        let report = self.run_batch("ed2k", &folders, |folder, tally| {
            self.extract_archives(folder, tally);
            link_count += self.collect_links(folder, &output_file, delete_sources, tally);
        });
        self.record(&format!("Extracted {link_count} ed2k links to {}", output_file.display()));
        Ok(report)
    }

    /// Extract every archive directly inside `folder` into the folder itself.
    ///
    /// An archive is deleted only after the tool succeeded and the folder gained a new or rewritten entry,
    /// which then serves as the delete confirmation.
    fn extract_archives(&self, folder: &Path, tally: &mut BatchTally) {
        let config = self.config();
        let archives: Vec<FileRecord> = TreeScanner::new()
            .extensions(&config.archive_extensions)
            .scan(folder)
            .collect();
        if archives.is_empty() {
            return;
        }

        let tool = config.archive_tool.as_deref().and_then(crate::find_executable);
        let Some(tool) = tool else {
            let name = config
                .archive_tool
                .as_deref()
                .map_or_else(|| "archive tool".to_string(), crate::path_to_string);
            self.notify(&ItemError::ExternalToolMissing(name).to_string());
            for archive in &archives {
                self.skip(tally, SkipReason::ToolMissing, &archive.path);
            }
            return;
        };

        let password = read_password(&folder.join(&config.archive_password_file));
        if password.is_some() {
            self.notify(&format!("Using archive password from {}", folder.display()));
        }

        for archive in &archives {
            if self.is_dryrun() {
                self.record(&format!("[dryrun] extract {}", archive.path.display()));
                tally.record_applied(true);
                continue;
            }
            let before = folder_snapshot(folder);
            match run_archive_tool(&tool, folder, &archive.path, password.as_deref()) {
                Ok(()) => {
                    tally.record_applied(false);
                    self.record(&format!("extract {}", archive.path.display()));
                    let Some(extracted) = first_changed_entry(folder, &before) else {
                        self.notify(&format!("Nothing was extracted from {}", archive.path.display()));
                        self.skip(tally, SkipReason::Unchanged, &archive.path);
                        continue;
                    };
                    self.apply(
                        &Action::Delete {
                            path: archive.path.clone(),
                            confirmed_by: extracted,
                        },
                        tally,
                    );
                }
                Err(error) => self.fail(tally, &error.to_string()),
            }
        }
    }

    /// Append the links of every text file directly inside `folder` to `output_file`.
    /// Returns the number of links written.
    fn collect_links(&self, folder: &Path, output_file: &Path, delete_sources: bool, tally: &mut BatchTally) -> usize {
        let config = self.config();
        let password_file = config.archive_password_file.clone();
        let texts: Vec<FileRecord> = TreeScanner::new()
            .extensions(["txt"])
            .name_filter(move |name| name != password_file)
            .scan(folder)
            .filter(|text| text.path != output_file)
            .collect();

        let mut written = 0;
        for text in &texts {
            let links = match fs::read(&text.path) {
                Ok(bytes) => parse_ed2k_links(&String::from_utf8_lossy(&bytes), &config.ed2k_header),
                Err(error) => {
                    self.fail(tally, &format!("Failed to read {}: {error}", text.path.display()));
                    continue;
                }
            };
            if links.is_empty() {
                self.skip(tally, SkipReason::NoCandidate, &text.path);
                continue;
            }

            if self.is_dryrun() {
                tally.record_applied(true);
                self.record(&format!("[dryrun] {} links from {}", links.len(), text.path.display()));
            } else if let Err(error) = append_lines(output_file, &links) {
                self.fail(tally, &format!("Failed to write {}: {error}", output_file.display()));
                continue;
            } else {
                tally.record_applied(false);
                self.record(&format!("{} links from {}", links.len(), text.path.display()));
            }
            written += links.len();

            if delete_sources {
                self.apply(
                    &Action::Delete {
                        path: text.path.clone(),
                        confirmed_by: output_file.to_path_buf(),
                    },
                    tally,
                );
            }
        }
        written
    }
}

/// Links listed in the block that follows the header line.
///
/// The block ends at an empty line or at a line ending with a colon.
pub(crate) fn parse_ed2k_links(text: &str, header: &str) -> Vec<String> {
    let mut links = Vec::new();
    let mut in_block = false;
    for line in text.lines().map(str::trim) {
        if line.contains(header) {
            in_block = true;
            continue;
        }
        if !in_block {
            continue;
        }
        if line.is_empty() || line.ends_with(':') || line.ends_with('：') {
            in_block = false;
            continue;
        }
        if line.starts_with(ED2K_PREFIX) {
            links.push(line.to_string());
        }
    }
    links
}

/// First non-empty line of the password file.
fn read_password(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

/// Modification time of every entry directly inside `folder`.
fn folder_snapshot(folder: &Path) -> HashMap<PathBuf, Option<SystemTime>> {
    fs::read_dir(folder)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| {
                    let modified = entry.metadata().and_then(|metadata| metadata.modified()).ok();
                    (entry.path(), modified)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// First entry, in name order, that is new or was rewritten since `before` was taken.
fn first_changed_entry(folder: &Path, before: &HashMap<PathBuf, Option<SystemTime>>) -> Option<PathBuf> {
    let mut changed: Vec<PathBuf> = folder_snapshot(folder)
        .into_iter()
        .filter(|(path, modified)| before.get(path).is_none_or(|previous| previous != modified))
        .map(|(path, _)| path)
        .collect();
    changed.sort();
    changed.into_iter().next()
}

fn run_archive_tool(tool: &Path, folder: &Path, archive: &Path, password: Option<&str>) -> Result<(), ItemError> {
    let mut command = Command::new(tool);
    command
        .arg("x")
        .arg(format!("-o:{}", folder.display()))
        .arg("-y");
    if let Some(password) = password {
        command.arg(format!("-p:{password}"));
    }
    command.arg(archive);

    let output = command.output().map_err(|error| ItemError::ExternalToolFailed {
        path: archive.to_path_buf(),
        message: error.to_string(),
    })?;
    if output.status.success() {
        return Ok(());
    }
    // The extractor reports errors in the Traditional Chinese code page
    let (stderr, _, _) = encoding_rs::BIG5.decode(&output.stderr);
    let message: String = stderr.trim().chars().take(MAX_TOOL_MESSAGE_CHARS).collect();
    Err(ItemError::ExternalToolFailed {
        path: archive.to_path_buf(),
        message: if message.is_empty() {
            output.status.to_string()
        } else {
            message
        },
    })
}

fn append_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    file.flush()
}
