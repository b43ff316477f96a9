//! Choosing the source for a target among competing candidates.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::identifier::{self, CanonicalId};
use crate::index::{PriorityIndex, SizeIndex};
use crate::scanner::{FileRecord, TreeScanner};

/// Why a source was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rationale {
    /// One file covers the whole content item.
    WholeMatch,
    /// Several files jointly cover the content item.
    PartMatch,
    /// The source is strictly larger than the target.
    SizeWin,
    NoCandidate,
}

/// Resolution for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionDecision {
    /// Chosen sources: empty, one, or an ordered multi-part set.
    pub sources: Vec<FileRecord>,
    pub rationale: Rationale,
    /// Search root that produced the sources.
    pub root: Option<PathBuf>,
    /// Several equally good candidates existed and the first one in scan order was taken.
    pub ambiguous: bool,
}

/// Where an incoming book goes inside its title folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionPlan {
    /// Folder is empty, keep the original file name.
    Fresh { destination: PathBuf },
    /// An occupant has the same byte size: take over its slot.
    SameRelease { destination: PathBuf },
    /// Store as a new version, optionally renaming a single unversioned occupant to version 1 first.
    NewVersion {
        rename_existing: Option<(PathBuf, PathBuf)>,
        destination: PathBuf,
    },
}

impl fmt::Display for Rationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WholeMatch => "whole-match",
            Self::PartMatch => "part-match",
            Self::SizeWin => "size-win",
            Self::NoCandidate => "no-candidate",
        };
        write!(f, "{name}")
    }
}

impl SelectionDecision {
    #[must_use]
    pub const fn no_candidate() -> Self {
        Self {
            sources: Vec::new(),
            rationale: Rationale::NoCandidate,
            root: None,
            ambiguous: false,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Pick sources for `id` among the candidates of a single root.
///
/// A whole match wins, preferring the first whole candidate with the most preferred extension.
/// Without a whole match, all parts with the most preferred extension that has any are returned,
/// sorted by file name. Returns `None` when nothing qualifies.
#[must_use]
pub fn select_within_root(
    id: &CanonicalId,
    candidates: &[FileRecord],
    preference: &[String],
) -> Option<SelectionDecision> {
    let whole: Vec<&FileRecord> = candidates
        .iter()
        .filter(|candidate| id.is_whole_stem(&candidate.stem))
        .collect();

    if let Some(first) = whole.first() {
        let chosen = preference
            .iter()
            .find_map(|extension| whole.iter().find(|candidate| &candidate.extension == extension))
            .unwrap_or(first);
        let same_extension = whole
            .iter()
            .filter(|candidate| candidate.extension == chosen.extension)
            .count();
        return Some(SelectionDecision {
            sources: vec![(*chosen).clone()],
            rationale: Rationale::WholeMatch,
            root: None,
            ambiguous: same_extension > 1,
        });
    }

    preference.iter().find_map(|extension| {
        let mut parts: Vec<FileRecord> = candidates
            .iter()
            .filter(|candidate| &candidate.extension == extension)
            .cloned()
            .collect();
        if parts.is_empty() {
            return None;
        }
        parts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
        Some(SelectionDecision {
            sources: parts,
            rationale: Rationale::PartMatch,
            root: None,
            ambiguous: false,
        })
    })
}

/// Search roots in priority order and stop at the first one that yields a selection.
///
/// Candidates are never merged across roots.
/// A root whose candidates do not qualify is passed over.
#[must_use]
pub fn select_by_priority(index: &PriorityIndex, id: &CanonicalId, preference: &[String]) -> SelectionDecision {
    index
        .roots()
        .find_map(|root| {
            let candidates = root.index.candidates(id);
            if candidates.is_empty() {
                return None;
            }
            select_within_root(id, candidates, preference).map(|decision| SelectionDecision {
                root: Some(root.root.clone()),
                ..decision
            })
        })
        .unwrap_or_else(SelectionDecision::no_candidate)
}

/// Select the indexed source for the target's identifier if it is strictly larger than the target.
#[must_use]
pub fn select_if_larger(index: &SizeIndex, target: &FileRecord) -> SelectionDecision {
    let Some(id) = target.canonical_id() else {
        return SelectionDecision::no_candidate();
    };
    match index.get(&id) {
        Some(source) if source.size > target.size => SelectionDecision {
            sources: vec![source.clone()],
            rationale: Rationale::SizeWin,
            root: None,
            ambiguous: false,
        },
        _ => SelectionDecision::no_candidate(),
    }
}

/// Book file name for a version ordinal: `<title>-v<N><.ext>`.
#[must_use]
pub fn versioned_name(title: &str, ordinal: usize, dotted_extension: &str) -> String {
    format!("{title}-v{ordinal}{dotted_extension}")
}

/// Plan where an incoming file goes inside the folder of its derived title.
///
/// A file of different byte size is never overwritten:
/// the incoming file becomes the next free version instead.
pub fn plan_version_slot(folder: &Path, title: &str, incoming: &FileRecord) -> io::Result<VersionPlan> {
    let occupants: Vec<FileRecord> = if folder.is_dir() {
        TreeScanner::new().scan(folder).collect()
    } else {
        Vec::new()
    };

    if occupants.is_empty() {
        return Ok(VersionPlan::Fresh {
            destination: folder.join(&incoming.name),
        });
    }

    if let Some(same) = occupants.iter().find(|occupant| occupant.size == incoming.size) {
        return Ok(VersionPlan::SameRelease {
            destination: same.path.clone(),
        });
    }

    let rename_existing = match occupants.as_slice() {
        [single] if identifier::version_ordinal(&single.stem).is_none() => {
            let renamed = folder.join(versioned_name(title, 1, &crate::dotted_extension(&single.path)));
            if renamed.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("Version slot already taken: {}", renamed.display()),
                ));
            }
            Some((single.path.clone(), renamed))
        }
        _ => None,
    };

    let extension = crate::dotted_extension(&incoming.path);
    let mut ordinal = occupants.len() + 1;
    let destination = loop {
        let candidate = folder.join(versioned_name(title, ordinal, &extension));
        let reserved = rename_existing.as_ref().is_some_and(|(_, renamed)| renamed == &candidate);
        if !candidate.exists() && !reserved {
            break candidate;
        }
        ordinal += 1;
    };

    Ok(VersionPlan::NewVersion {
        rename_existing,
        destination,
    })
}

#[cfg(test)]
mod selection_tests {
    use super::*;

    use std::fs;

    use tempfile::tempdir;

    fn record(path: &str, size: u64) -> FileRecord {
        let path = PathBuf::from(path);
        FileRecord {
            name: crate::path_to_filename_string(&path),
            stem: crate::path_to_file_stem_string(&path),
            extension: crate::path_to_file_extension_string(&path),
            parent_name: path.parent().map(crate::path_to_filename_string).unwrap_or_default(),
            path,
            size,
        }
    }

    fn id(value: &str) -> CanonicalId {
        identifier::extract(value).expect("valid id")
    }

    fn preference() -> Vec<String> {
        vec!["ass".to_string(), "srt".to_string()]
    }

    fn names(decision: &SelectionDecision) -> Vec<&str> {
        decision.sources.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn whole_match_prefers_richer_format() {
        let candidates = [
            record("/s/ABC-001.srt", 1),
            record("/s/abc-001.ass", 1),
            record("/s/ABC-001 cd1.ass", 1),
        ];
        let decision = select_within_root(&id("ABC-001"), &candidates, &preference()).expect("selection");
        assert_eq!(decision.rationale, Rationale::WholeMatch);
        assert_eq!(names(&decision), vec!["abc-001.ass"]);
        assert!(!decision.ambiguous);
    }

    #[test]
    fn whole_match_without_preferred_extension_takes_first() {
        let candidates = [record("/s/ABC-001.vtt", 1), record("/s/ABC-001.ssa", 1)];
        let decision = select_within_root(&id("ABC-001"), &candidates, &preference()).expect("selection");
        assert_eq!(names(&decision), vec!["ABC-001.vtt"]);
    }

    #[test]
    fn duplicate_whole_matches_are_flagged_ambiguous() {
        let candidates = [record("/s/a/ABC-001.ass", 1), record("/s/b/ABC-001.ass", 2)];
        let decision = select_within_root(&id("ABC-001"), &candidates, &preference()).expect("selection");
        assert!(decision.ambiguous);
        assert_eq!(decision.sources[0].path, PathBuf::from("/s/a/ABC-001.ass"));
    }

    #[test]
    fn parts_are_sorted_and_use_preferred_extension() {
        let candidates = [
            record("/s/ABC-001 cd2.ass", 1),
            record("/s/ABC-001 cd1.ass", 1),
            record("/s/ABC-001 cd1.srt", 1),
        ];
        let decision = select_within_root(&id("ABC-001"), &candidates, &preference()).expect("selection");
        assert_eq!(decision.rationale, Rationale::PartMatch);
        assert_eq!(names(&decision), vec!["ABC-001 cd1.ass", "ABC-001 cd2.ass"]);
    }

    #[test]
    fn parts_fall_back_to_next_extension() {
        let candidates = [record("/s/ABC-001.chs.srt", 1), record("/s/ABC-001.cht.srt", 1)];
        let decision = select_within_root(&id("ABC-001"), &candidates, &preference()).expect("selection");
        assert_eq!(names(&decision), vec!["ABC-001.chs.srt", "ABC-001.cht.srt"]);
    }

    #[test]
    fn unpreferred_parts_yield_nothing() {
        let candidates = [record("/s/ABC-001 cd1.vtt", 1)];
        assert!(select_within_root(&id("ABC-001"), &candidates, &preference()).is_none());
    }

    #[test]
    fn first_root_with_result_wins() {
        let dir = tempdir().expect("tempdir");
        let root_a = dir.path().join("a");
        let root_b = dir.path().join("b");
        fs::create_dir_all(&root_a).expect("mkdir");
        fs::create_dir_all(&root_b).expect("mkdir");
        fs::write(root_a.join("ABC-001 cd1.srt"), "1").expect("write");
        fs::write(root_a.join("ABC-001 cd2.srt"), "2").expect("write");
        fs::write(root_b.join("ABC-001.ass"), "whole").expect("write");

        let index = PriorityIndex::build(&[root_a.clone(), root_b], &TreeScanner::new());
        let decision = select_by_priority(&index, &id("ABC-001"), &preference());
        assert_eq!(decision.rationale, Rationale::PartMatch);
        assert_eq!(decision.root, Some(root_a));
        assert_eq!(names(&decision), vec!["ABC-001 cd1.srt", "ABC-001 cd2.srt"]);
    }

    #[test]
    fn root_with_unqualified_candidates_is_passed_over() {
        let dir = tempdir().expect("tempdir");
        let root_a = dir.path().join("a");
        let root_b = dir.path().join("b");
        fs::create_dir_all(&root_a).expect("mkdir");
        fs::create_dir_all(&root_b).expect("mkdir");
        fs::write(root_a.join("ABC-001 cd1.vtt"), "1").expect("write");
        fs::write(root_b.join("ABC-001.srt"), "whole").expect("write");

        let index = PriorityIndex::build(&[root_a, root_b.clone()], &TreeScanner::new());
        let decision = select_by_priority(&index, &id("ABC-001"), &preference());
        assert_eq!(decision.rationale, Rationale::WholeMatch);
        assert_eq!(decision.root, Some(root_b));
    }

    #[test]
    fn missing_everywhere_is_no_candidate() {
        let index = PriorityIndex::default();
        let decision = select_by_priority(&index, &id("ABC-001"), &preference());
        assert_eq!(decision, SelectionDecision::no_candidate());
        assert_eq!(decision.rationale.to_string(), "no-candidate");
    }

    #[test]
    fn size_selection_requires_strictly_larger() {
        let index = SizeIndex::build([record("/covers/abc-001.jpg", 50000)]);
        let smaller = record("/lib/ABC-001-fanart.jpg", 20000);
        let equal = record("/lib/ABC-001-thumb.jpg", 50000);
        let larger = record("/lib/ABC-001-poster.jpg", 60000);

        assert_eq!(select_if_larger(&index, &smaller).rationale, Rationale::SizeWin);
        assert!(select_if_larger(&index, &equal).is_empty());
        assert!(select_if_larger(&index, &larger).is_empty());
    }

    #[test]
    fn version_plan_for_empty_folder_keeps_name() {
        let dir = tempdir().expect("tempdir");
        let incoming = record("/src/ABC-12 My Book.zip", 100);
        let plan = plan_version_slot(&dir.path().join("My Book"), "My Book", &incoming).expect("plan");
        assert_eq!(
            plan,
            VersionPlan::Fresh {
                destination: dir.path().join("My Book").join("ABC-12 My Book.zip")
            }
        );
    }

    #[test]
    fn version_plan_same_size_takes_slot() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("My Book.zip"), vec![0_u8; 100]).expect("write");
        let incoming = record("/src/ABC-12 My Book.zip", 100);
        let plan = plan_version_slot(dir.path(), "My Book", &incoming).expect("plan");
        assert_eq!(
            plan,
            VersionPlan::SameRelease {
                destination: dir.path().join("My Book.zip")
            }
        );
    }

    #[test]
    fn version_plan_renames_single_occupant() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("My Book.zip"), vec![0_u8; 100]).expect("write");
        let incoming = record("/src/My Book 1.02.zip", 200);
        let plan = plan_version_slot(dir.path(), "My Book", &incoming).expect("plan");
        assert_eq!(
            plan,
            VersionPlan::NewVersion {
                rename_existing: Some((dir.path().join("My Book.zip"), dir.path().join("My Book-v1.zip"))),
                destination: dir.path().join("My Book-v2.zip"),
            }
        );
    }

    #[test]
    fn version_plan_skips_taken_ordinals() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("My Book-v1.zip"), vec![0_u8; 100]).expect("write");
        fs::write(dir.path().join("My Book-v3.zip"), vec![0_u8; 300]).expect("write");
        let incoming = record("/src/My Book.zip", 200);
        let plan = plan_version_slot(dir.path(), "My Book", &incoming).expect("plan");
        assert_eq!(
            plan,
            VersionPlan::NewVersion {
                rename_existing: None,
                destination: dir.path().join("My Book-v4.zip"),
            }
        );
    }
}
