use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local};

use crate::config::EngineConfig;
use crate::engine::{BatchReport, MediaEngine, ensure_directory};
use crate::executor::{Action, Guard, SkipReason};
use crate::scanner::{FileRecord, TreeScanner};

/// Media category of a file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

/// Which folder levels [`MediaEngine::organize_by_type_and_date`] creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganizeLayout {
    /// `<kind>/` folder per media category
    pub by_type: bool,
    /// `<YYYY>/<MM>/` folders from the modification time
    pub by_date: bool,
}

impl Default for OrganizeLayout {
    fn default() -> Self {
        Self {
            by_type: true,
            by_date: true,
        }
    }
}

impl MediaKind {
    /// Category for a lowercase extension without the dot.
    #[must_use]
    pub fn from_extension(extension: &str, config: &EngineConfig) -> Option<Self> {
        let contains = |list: &[String]| list.iter().any(|known| known == extension);
        if contains(&config.image_extensions) {
            Some(Self::Image)
        } else if contains(&config.video_extensions) {
            Some(Self::Video)
        } else if contains(&config.audio_extensions) {
            Some(Self::Audio)
        } else if contains(&config.document_extensions) {
            Some(Self::Document)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn folder_name(self) -> &'static str {
        match self {
            Self::Image => "图片",
            Self::Video => "视频",
            Self::Audio => "音频",
            Self::Document => "文档",
        }
    }
}

impl MediaEngine {
    /// Move every media file under `source_root` to `target_root/<kind>/<YYYY>/<MM>/<name>`.
    ///
    /// Existing files are never overwritten. Files already in their place are left alone.
    pub fn organize_by_type_and_date(
        &self,
        source_root: &Path,
        target_root: &Path,
        layout: OrganizeLayout,
    ) -> Result<BatchReport> {
        ensure_directory(source_root, "Source root")?;
        let config = self.config();
        let extensions: Vec<&String> = config
            .image_extensions
            .iter()
            .chain(&config.video_extensions)
            .chain(&config.audio_extensions)
            .chain(&config.document_extensions)
            .collect();
        let files: Vec<FileRecord> = TreeScanner::new()
            .recursive(true)
            .extensions(extensions)
            .scan(source_root)
            .collect();

        Ok(self.run_batch("organize", &files, |file, tally| {
            let modified = match fs::metadata(&file.path).and_then(|metadata| metadata.modified()) {
                Ok(modified) => DateTime::<Local>::from(modified),
                Err(error) => {
                    self.fail(tally, &format!("Failed to read modification time of {}: {error}", file.path.display()));
                    return;
                }
            };
            let kind = MediaKind::from_extension(&file.extension, config);
            let destination = organized_path(target_root, file, kind, modified, layout);
            if destination == file.path {
                self.skip(tally, SkipReason::Unchanged, &file.path);
                return;
            }
            self.apply(
                &Action::Move {
                    source: file.path.clone(),
                    destination,
                    guard: Guard::DestinationAbsent,
                },
                tally,
            );
        }))
    }
}

fn organized_path(
    target_root: &Path,
    file: &FileRecord,
    kind: Option<MediaKind>,
    modified: DateTime<Local>,
    layout: OrganizeLayout,
) -> PathBuf {
    let mut path = target_root.to_path_buf();
    if layout.by_type
        && let Some(kind) = kind
    {
        path.push(kind.folder_name());
    }
    if layout.by_date {
        path.push(modified.format("%Y").to_string());
        path.push(modified.format("%m").to_string());
    }
    path.join(&file.name)
}
