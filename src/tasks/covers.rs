use std::path::Path;

use anyhow::Result;

use crate::engine::{BatchReport, MediaEngine, ensure_directory};
use crate::executor::{Action, Guard, SkipReason};
use crate::index::SizeIndex;
use crate::scanner::{FileRecord, TreeScanner};
use crate::selection::select_if_larger;

impl MediaEngine {
    /// Replace cover images under `target_root` with the largest image of the same identifier
    /// found anywhere in `cover_repo`.
    ///
    /// Only images whose stem ends with a cover target suffix (`-fanart`, `-thumb`) are replaced,
    /// and only when the repository image is strictly larger. Running it again changes nothing.
    pub fn replace_covers_by_size(&self, cover_repo: &Path, target_root: &Path) -> Result<BatchReport> {
        ensure_directory(cover_repo, "Cover repository")?;
        ensure_directory(target_root, "Target root")?;

        let images = &self.config().image_extensions;
        let index = SizeIndex::build(TreeScanner::new().recursive(true).extensions(images).scan(cover_repo));
        self.notify(&format!("Indexed covers for {} identifiers", index.len()));

        let suffixes = self.config().cover_target_suffixes.clone();
        let targets: Vec<FileRecord> = TreeScanner::new()
            .recursive(true)
            .extensions(images)
            .name_filter(move |name| {
                let stem = crate::path_to_file_stem_string(Path::new(name)).to_lowercase();
                suffixes.iter().any(|suffix| stem.ends_with(suffix.as_str()))
            })
            .scan(target_root)
            .collect();

        Ok(self.run_batch("covers", &targets, |target, tally| {
            let Some(id) = target.canonical_id() else {
                self.skip(tally, SkipReason::NoIdentifier, &target.path);
                return;
            };
            if index.get(&id).is_none() {
                self.skip(tally, SkipReason::NoCandidate, &target.path);
                return;
            }
            let decision = select_if_larger(&index, target);
            let Some(source) = decision.sources.first() else {
                self.skip(tally, SkipReason::NotLarger, &target.path);
                return;
            };
            self.notify(&format!(
                "{id}: {} -> {}",
                crate::format_size(target.size),
                crate::format_size(source.size)
            ));
            self.apply(
                &Action::Copy {
                    source: source.path.clone(),
                    destination: target.path.clone(),
                    guard: Guard::SourceLarger,
                },
                tally,
            );
        }))
    }
}
