//! Grouping of scanned files by canonical identifier.
//!
//! Indexes are built eagerly from a full scan. This is fine for trees of tens of thousands of files,
//! much larger trees would need a streaming index instead.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::identifier::CanonicalId;
use crate::scanner::{FileRecord, TreeScanner};

/// Files grouped by canonical identifier, in discovery order within each group.
#[derive(Debug, Default, Clone)]
pub struct CandidateIndex {
    groups: HashMap<CanonicalId, Vec<FileRecord>>,
    unmatched: Vec<FileRecord>,
}

/// Candidate index of one search root.
#[derive(Debug, Clone)]
pub struct RootIndex {
    pub root: PathBuf,
    pub index: CandidateIndex,
}

/// One candidate index per search root, in caller priority order.
#[derive(Debug, Default, Clone)]
pub struct PriorityIndex {
    roots: Vec<RootIndex>,
}

/// Largest file seen for each identifier across a whole tree.
#[derive(Debug, Default, Clone)]
pub struct SizeIndex {
    largest: HashMap<CanonicalId, FileRecord>,
}

impl CandidateIndex {
    /// Group records by identifier. Records without one are kept aside as unmatched.
    pub fn build(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.insert(record);
        }
        index
    }

    pub fn insert(&mut self, record: FileRecord) {
        match record.canonical_id() {
            Some(id) => self.groups.entry(id).or_default().push(record),
            None => self.unmatched.push(record),
        }
    }

    /// All candidates for the identifier in discovery order.
    #[must_use]
    pub fn candidates(&self, id: &CanonicalId) -> &[FileRecord] {
        self.groups.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First candidate in discovery order.
    #[must_use]
    pub fn first(&self, id: &CanonicalId) -> Option<&FileRecord> {
        self.candidates(id).first()
    }

    /// Identifiers in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<&CanonicalId> {
        self.groups.keys().sorted().collect()
    }

    /// Groups sorted by identifier.
    pub fn groups(&self) -> impl Iterator<Item = (&CanonicalId, &[FileRecord])> {
        self.groups
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(id, records)| (id, records.as_slice()))
    }

    /// Number of distinct identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Records that had no identifier.
    #[must_use]
    pub fn unmatched(&self) -> &[FileRecord] {
        &self.unmatched
    }
}

impl PriorityIndex {
    /// Scan and index every root with the same scanner, keeping the given order.
    #[must_use]
    pub fn build(roots: &[PathBuf], scanner: &TreeScanner) -> Self {
        let roots = roots
            .iter()
            .map(|root| RootIndex {
                root: root.clone(),
                index: CandidateIndex::build(scanner.scan(root)),
            })
            .collect();
        Self { roots }
    }

    /// Root indexes in priority order.
    pub fn roots(&self) -> impl Iterator<Item = &RootIndex> {
        self.roots.iter()
    }

    #[must_use]
    pub fn root_paths(&self) -> Vec<&Path> {
        self.roots.iter().map(|root| root.root.as_path()).collect()
    }
}

impl SizeIndex {
    /// Keep the largest record per identifier. On equal size the first one seen stays.
    pub fn build(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.offer(record);
        }
        index
    }

    /// Add a record if it is strictly larger than the current best for its identifier.
    /// Returns true if the record was kept.
    pub fn offer(&mut self, record: FileRecord) -> bool {
        let Some(id) = record.canonical_id() else {
            return false;
        };
        match self.largest.entry(id) {
            Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
            Entry::Occupied(mut entry) => {
                if record.size > entry.get().size {
                    entry.insert(record);
                    true
                } else {
                    false
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &CanonicalId) -> Option<&FileRecord> {
        self.largest.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.largest.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.largest.is_empty()
    }
}
