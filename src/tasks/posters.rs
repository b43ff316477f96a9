use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

use crate::engine::{BatchReport, MediaEngine, ensure_directory};
use crate::executor::{Action, Guard, ItemError, Outcome, SkipReason};
use crate::index::CandidateIndex;
use crate::mapping::{MappingRecord, MappingWriter, read_mapping};
use crate::scanner::{FileRecord, TreeScanner};

impl MediaEngine {
    /// Copy every poster under `source` into `work_dir` for external enhancement,
    /// smallest first, and write the mapping file used by [`Self::import_posters`].
    pub fn export_posters(&self, source: &Path, work_dir: &Path, launch_enhancer: bool) -> Result<BatchReport> {
        ensure_directory(source, "Poster source")?;
        let mut posters = self.scan_posters(source);
        posters.sort_by_key(|poster| poster.size);

        let mut mapping = if self.is_dryrun() {
            None
        } else {
            fs::create_dir_all(work_dir)
                .with_context(|| format!("Failed to create work directory: {}", work_dir.display()))?;
            Some(MappingWriter::create(&self.config().mapping_path())?)
        };
        let mut used_names: HashSet<String> = HashSet::new();

        let report = self.run_batch("poster export", &posters, |poster, tally| {
            let filename = unique_name(&poster.name, &mut used_names);
            let outcome = self.apply(
                &Action::Copy {
                    source: poster.path.clone(),
                    destination: work_dir.join(&filename),
                    guard: Guard::Always,
                },
                tally,
            );
            if outcome == Some(Outcome::Applied)
                && let Some(writer) = mapping.as_mut()
            {
                let record = MappingRecord {
                    filename,
                    original_path: poster.path.clone(),
                };
                if let Err(error) = writer.append(&record) {
                    self.fail(tally, &format!("{error:#}"));
                }
            }
        });

        if let Some(writer) = mapping {
            writer.finish()?;
            self.record(&format!(
                "Poster mapping written to {}",
                self.config().mapping_path().display()
            ));
        }
        if launch_enhancer && !report.cancelled {
            self.launch_enhancer(work_dir);
        }
        Ok(report)
    }

    /// Copy enhanced working copies back to the original paths recorded in the mapping file.
    ///
    /// A row whose working copy no longer exists counts as a failure.
    pub fn import_posters(&self, work_dir: &Path) -> Result<BatchReport> {
        let mapping_path = self.config().mapping_path();
        if !mapping_path.is_file() {
            anyhow::bail!(
                "Mapping file not found: {}\nExport posters first",
                mapping_path.display()
            );
        }
        let rows = read_mapping(&mapping_path)?;

        Ok(self.run_batch("poster import", &rows, |row, tally| {
            let record = match row {
                Ok(record) => record,
                Err(error) => {
                    self.fail(tally, &error.to_string());
                    return;
                }
            };
            let working_copy = work_dir.join(&record.filename);
            if !working_copy.is_file() {
                self.fail(tally, &ItemError::SourceMissing(working_copy).to_string());
                return;
            }
            self.apply(
                &Action::Copy {
                    source: working_copy,
                    destination: record.original_path.clone(),
                    guard: Guard::Always,
                },
                tally,
            );
        }))
    }

    /// Overwrite posters under `output_root` with the first image directly inside `image_source`
    /// that has the same identifier.
    pub fn replace_posters_from_source(&self, output_root: &Path, image_source: &Path) -> Result<BatchReport> {
        ensure_directory(output_root, "Output root")?;
        ensure_directory(image_source, "Image source")?;

        let index = CandidateIndex::build(
            TreeScanner::new()
                .extensions(&self.config().image_extensions)
                .scan(image_source),
        );
        let posters = self.scan_posters(output_root);

        Ok(self.run_batch("poster replace", &posters, |poster, tally| {
            let Some(id) = poster.canonical_id() else {
                self.skip(tally, SkipReason::NoIdentifier, &poster.path);
                return;
            };
            let Some(source) = index.first(&id) else {
                self.skip(tally, SkipReason::NoCandidate, &poster.path);
                return;
            };
            self.apply(
                &Action::Copy {
                    source: source.path.clone(),
                    destination: poster.path.clone(),
                    guard: Guard::Always,
                },
                tally,
            );
        }))
    }

    /// Images anywhere under `root` with the poster keyword in their name.
    fn scan_posters(&self, root: &Path) -> Vec<FileRecord> {
        let keyword = self.config().poster_keyword.clone();
        TreeScanner::new()
            .recursive(true)
            .extensions(&self.config().image_extensions)
            .name_filter(move |name| name.to_lowercase().contains(&keyword))
            .scan(root)
            .collect()
    }

    fn launch_enhancer(&self, work_dir: &Path) {
        let Some(configured) = self.config().enhancer_path.as_deref() else {
            self.notify(&ItemError::ExternalToolMissing("no enhancer configured".to_string()).to_string());
            return;
        };
        let Some(executable) = crate::find_executable(configured) else {
            self.notify(&ItemError::ExternalToolMissing(configured.display().to_string()).to_string());
            return;
        };
        if self.is_dryrun() {
            self.notify(&format!("[dryrun] {} {}", executable.display(), work_dir.display()));
            return;
        }
        match Command::new(&executable).arg(work_dir).spawn() {
            Ok(_) => self.record(&format!("Started {}", executable.display())),
            Err(error) => self.record(&format!("error: Failed to start {}: {error}", executable.display())),
        }
    }
}

/// Make working copy names unique within one export: `a.jpg`, `a_2.jpg`, `a_3.jpg`.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut number = 2;
    while !used.insert(candidate.to_lowercase()) {
        candidate = crate::path_to_string(&crate::insert_suffix_before_extension(
            Path::new(name),
            &format!("_{number}"),
        ));
        number += 1;
    }
    candidate
}

#[cfg(test)]
mod posters_tests {
    use super::*;

    use tempfile::tempdir;

    use crate::{Callbacks, EngineConfig};

    fn engine(dir: &Path) -> MediaEngine {
        let config = EngineConfig {
            log_dir: dir.join("logs"),
            ..EngineConfig::default()
        };
        MediaEngine::new(config, Callbacks::default()).expect("engine")
    }

    #[test]
    fn unique_names_get_numbered() {
        let mut used = HashSet::new();
        assert_eq!(unique_name("ABC-001-poster.jpg", &mut used), "ABC-001-poster.jpg");
        assert_eq!(unique_name("abc-001-poster.jpg", &mut used), "abc-001-poster_2.jpg");
        assert_eq!(unique_name("ABC-001-poster.jpg", &mut used), "ABC-001-poster_3.jpg");
    }

    #[test]
    fn export_orders_by_size_and_renames_duplicates() {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("library");
        fs::create_dir_all(source.join("a")).expect("mkdir");
        fs::create_dir_all(source.join("b")).expect("mkdir");
        fs::write(source.join("a/ABC-001-poster.jpg"), vec![0_u8; 30]).expect("write");
        fs::write(source.join("b/ABC-001-poster.jpg"), vec![0_u8; 10]).expect("write");
        fs::write(source.join("b/ABC-001-fanart.jpg"), vec![0_u8; 10]).expect("write");

        let engine = engine(dir.path());
        let work = dir.path().join("work");
        let report = engine.export_posters(&source, &work, false).expect("export");
        assert_eq!(report.tally.applied, 2);

        let rows: Vec<MappingRecord> = read_mapping(&engine.config().mapping_path())
            .expect("mapping")
            .into_iter()
            .map(|row| row.expect("valid row"))
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].filename, "ABC-001-poster.jpg");
        assert_eq!(rows[0].original_path, source.join("b/ABC-001-poster.jpg"));
        assert_eq!(rows[1].filename, "ABC-001-poster_2.jpg");
        assert_eq!(fs::metadata(work.join("ABC-001-poster_2.jpg")).expect("meta").len(), 30);
    }

    #[test]
    fn import_without_mapping_fails() {
        let dir = tempdir().expect("tempdir");
        assert!(engine(dir.path()).import_posters(dir.path()).is_err());
    }

    #[test]
    fn import_counts_missing_working_copies() {
        let dir = tempdir().expect("tempdir");
        let engine = engine(dir.path());
        let work = dir.path().join("work");
        fs::create_dir_all(&work).expect("mkdir");
        let mut writer = MappingWriter::create(&engine.config().mapping_path()).expect("mapping");
        writer
            .append(&MappingRecord {
                filename: "gone.jpg".to_string(),
                original_path: dir.path().join("gone.jpg"),
            })
            .expect("append");
        writer.finish().expect("finish");

        let report = engine.import_posters(&work).expect("import");
        assert_eq!(report.tally.failed, 1);
        assert_eq!(report.tally.applied, 0);
    }

    #[test]
    fn replaces_posters_from_flat_source() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("output/ABC-001");
        let images = dir.path().join("images");
        fs::create_dir_all(&output).expect("mkdir");
        fs::create_dir_all(images.join("nested")).expect("mkdir");
        fs::write(output.join("ABC-001-poster.jpg"), "old").expect("write");
        fs::write(output.join("XYZ-002-poster.jpg"), "old").expect("write");
        fs::write(images.join("pf_abc-001.jpg"), "new").expect("write");
        fs::write(images.join("nested/XYZ-002.jpg"), "nested").expect("write");

        let report = engine(dir.path())
            .replace_posters_from_source(&dir.path().join("output"), &images)
            .expect("batch");
        assert_eq!(report.tally.applied, 1);
        assert_eq!(report.tally.skipped_for(SkipReason::NoCandidate), 1);
        assert_eq!(fs::read_to_string(output.join("ABC-001-poster.jpg")).expect("read"), "new");
        assert_eq!(fs::read_to_string(output.join("XYZ-002-poster.jpg")).expect("read"), "old");
    }

    #[test]
    fn dryrun_export_writes_nothing() {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("library");
        fs::create_dir_all(&source).expect("mkdir");
        fs::write(source.join("ABC-001-poster.jpg"), "x").expect("write");
        let config = EngineConfig {
            log_dir: dir.path().join("logs"),
            dryrun: true,
            ..EngineConfig::default()
        };
        let engine = MediaEngine::new(config, Callbacks::default()).expect("engine");
        let work = dir.path().join("work");

        let report = engine.export_posters(&source, &work, false).expect("export");
        assert_eq!(report.tally.planned, 1);
        assert!(!work.exists());
        assert!(!engine.config().mapping_path().exists());
    }
}
