use std::path::Path;

use anyhow::Result;

use crate::engine::{BatchReport, MediaEngine, ensure_directory};
use crate::executor::{Action, Guard, Outcome};
use crate::identifier::{TitleRule, derive_title};
use crate::scanner::{FileRecord, TreeScanner};
use crate::selection::{VersionPlan, plan_version_slot};

impl MediaEngine {
    /// Move book archives from `source` into per-title folders under `target`.
    ///
    /// A file with the same byte size as an existing occupant takes over its slot.
    /// A file of different size is stored as a new version next to the existing ones.
    pub fn organize_books(&self, source: &Path, target: &Path, rule: TitleRule) -> Result<BatchReport> {
        ensure_directory(source, "Book source")?;
        let books: Vec<FileRecord> = TreeScanner::new().scan(source).collect();

        Ok(self.run_batch("books", &books, |book, tally| {
            let title = derive_title(&book.stem, rule);
            let folder = target.join(&title);
            let plan = match plan_version_slot(&folder, &title, book) {
                Ok(plan) => plan,
                Err(error) => {
                    self.fail(tally, &format!("{}: {error}", book.path.display()));
                    return;
                }
            };

            let (destination, guard) = match plan {
                VersionPlan::Fresh { destination } => (destination, Guard::DestinationAbsent),
                VersionPlan::SameRelease { destination } => (destination, Guard::SameSize),
                VersionPlan::NewVersion {
                    rename_existing,
                    destination,
                } => {
                    if let Some((existing, renamed)) = rename_existing {
                        let outcome = self.apply(
                            &Action::Rename {
                                source: existing,
                                destination: renamed,
                                guard: Guard::DestinationAbsent,
                            },
                            tally,
                        );
                        if !matches!(outcome, Some(Outcome::Applied | Outcome::Planned)) {
                            return;
                        }
                    }
                    (destination, Guard::DestinationAbsent)
                }
            };

            self.apply(
                &Action::Move {
                    source: book.path.clone(),
                    destination,
                    guard,
                },
                tally,
            );
        }))
    }
}

#[cfg(test)]
mod books_tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::identifier::TitleRule;
    use crate::{Callbacks, EngineConfig, MediaEngine};

    #[test]
    fn same_size_replaces_slot() {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("incoming");
        let target = dir.path().join("library");
        fs::create_dir_all(&source).expect("mkdir");
        fs::create_dir_all(target.join("My Book")).expect("mkdir");
        fs::write(target.join("My Book/ABC-1 My Book.zip"), vec![0_u8; 64]).expect("write");
        fs::write(source.join("ABC-1 My Book 1.01.zip"), vec![1_u8; 64]).expect("write");

        let config = EngineConfig {
            log_dir: dir.path().join("logs"),
            ..EngineConfig::default()
        };
        let engine = MediaEngine::new(config, Callbacks::default()).expect("engine");
        let report = engine.organize_books(&source, &target, TitleRule::Code).expect("batch");

        assert_eq!(report.tally.applied, 1);
        let entries: Vec<_> = fs::read_dir(target.join("My Book")).expect("read dir").collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            fs::read(target.join("My Book/ABC-1 My Book.zip")).expect("read"),
            vec![1_u8; 64]
        );
    }

    #[test]
    fn bracket_rule_groups_titles() {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("incoming");
        let target = dir.path().join("library");
        fs::create_dir_all(&source).expect("mkdir");
        fs::write(source.join("[Group] Title [Digital].zip"), "x").expect("write");

        let config = EngineConfig {
            log_dir: dir.path().join("logs"),
            ..EngineConfig::default()
        };
        let engine = MediaEngine::new(config, Callbacks::default()).expect("engine");
        engine
            .organize_books(&source, &target, TitleRule::Bracket)
            .expect("batch");
        assert!(target.join("Title/[Group] Title [Digital].zip").exists());
    }
}
