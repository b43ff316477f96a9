use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::engine::{BatchReport, MediaEngine, ensure_directory};
use crate::executor::{Action, Guard, SkipReason};
use crate::identifier::{self, CanonicalId};
use crate::index::PriorityIndex;
use crate::scanner::{FileRecord, TreeScanner};
use crate::selection::{SelectionDecision, select_by_priority};

impl MediaEngine {
    /// Copy the best matching subtitle next to every video under `video_root`.
    ///
    /// Subtitles are searched under `subs_root/<dir>` for each existing priority directory in order,
    /// then under `subs_root` itself. The first root that produces a selection wins.
    /// Existing subtitle files are never overwritten.
    pub fn match_subtitles(&self, video_root: &Path, subs_root: &Path, priority_dirs: &[String]) -> Result<BatchReport> {
        ensure_directory(video_root, "Video root")?;
        ensure_directory(subs_root, "Subtitle root")?;

        let config = self.config();
        let excludes = config.subtitle_exclude_keywords.clone();
        let videos: Vec<FileRecord> = TreeScanner::new()
            .recursive(true)
            .extensions(&config.video_extensions)
            .name_filter(move |name| {
                let name = name.to_lowercase();
                !excludes.iter().any(|keyword| name.contains(keyword.as_str()))
            })
            .scan(video_root)
            .collect();

        let roots = search_roots(subs_root, priority_dirs);
        let index = PriorityIndex::build(
            &roots,
            &TreeScanner::new()
                .recursive(true)
                .extensions(&config.subtitle_extensions),
        );
        let root_names: Vec<String> = index.root_paths().iter().map(|root| root.display().to_string()).collect();
        self.notify(&format!("Subtitle search order: {}", root_names.join(", ")));
        let mut decisions: HashMap<CanonicalId, SelectionDecision> = HashMap::new();

        Ok(self.run_batch("subtitles", &videos, |video, tally| {
            let Some(id) = video.canonical_id() else {
                self.skip(tally, SkipReason::NoIdentifier, &video.path);
                return;
            };
            let decision = decisions.entry(id.clone()).or_insert_with(|| {
                let decision = select_by_priority(&index, &id, &config.subtitle_preference);
                if decision.ambiguous
                    && let Some(source) = decision.sources.first()
                {
                    self.notify(&format!(
                        "Several whole subtitles for {id}, using {}",
                        source.path.display()
                    ));
                }
                decision
            });
            if decision.is_empty() {
                self.skip(tally, SkipReason::NoCandidate, &video.path);
                return;
            }

            let multi_part = decision.sources.len() > 1;
            for (number, source) in decision.sources.iter().enumerate() {
                let part = multi_part.then_some(number + 1);
                let destination = self.subtitle_destination(video, source, part);
                self.apply(
                    &Action::Copy {
                        source: source.path.clone(),
                        destination,
                        guard: Guard::DestinationAbsent,
                    },
                    tally,
                );
            }
        }))
    }

    /// Rename compact-form `.srt` subtitles such as `abc00123.srt` to `ABC-123.srt`.
    pub fn rename_subtitles_to_canonical(&self, root: &Path) -> Result<BatchReport> {
        ensure_directory(root, "Subtitle root")?;
        let subtitles: Vec<FileRecord> = TreeScanner::new().recursive(true).extensions(["srt"]).scan(root).collect();

        Ok(self.run_batch("subtitle rename", &subtitles, |subtitle, tally| {
            let Some(id) = identifier::from_compact_form(&subtitle.stem) else {
                self.skip(tally, SkipReason::NoIdentifier, &subtitle.path);
                return;
            };
            let new_name = format!("{id}.srt");
            if new_name == subtitle.name {
                self.skip(tally, SkipReason::Unchanged, &subtitle.path);
                return;
            }
            self.apply(
                &Action::Rename {
                    source: subtitle.path.clone(),
                    destination: subtitle.path.with_file_name(new_name),
                    guard: Guard::DestinationAbsent,
                },
                tally,
            );
        }))
    }

    /// `<video stem>.<tag>[.part<N>].<ext>` next to the video.
    ///
    /// The language tag is left out when the video stem already ends with one.
    fn subtitle_destination(&self, video: &FileRecord, subtitle: &FileRecord, part: Option<usize>) -> PathBuf {
        let config = self.config();
        let mut name = video.stem.clone();
        if !identifier::has_language_tag(&video.stem, &config.subtitle_language_tags) {
            name.push('.');
            name.push_str(&config.subtitle_language_tag);
        }
        if let Some(part) = part {
            name.push_str(&format!(".part{part}"));
        }
        name.push('.');
        name.push_str(&subtitle.extension);
        video.path.with_file_name(name)
    }
}

/// Existing priority directories in the given order, followed by the subtitle root itself.
fn search_roots(subs_root: &Path, priority_dirs: &[String]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = priority_dirs
        .iter()
        .map(|dir| subs_root.join(dir))
        .filter(|dir| dir.is_dir())
        .collect();
    if !roots.iter().any(|root| root == subs_root) {
        roots.push(subs_root.to_path_buf());
    }
    roots
}
