//! Poster mapping file: which working copy came from which original path.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer};

use crate::executor::ItemError;

pub const MAPPING_HEADER: [&str; 2] = ["filename", "original_path"];

/// One exported item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    /// File name of the working copy.
    pub filename: String,
    pub original_path: PathBuf,
}

/// Writes mapping rows as they are exported.
pub struct MappingWriter {
    writer: Writer<File>,
    path: PathBuf,
}

impl MappingWriter {
    /// Create or truncate the mapping file and write the header row.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create mapping directory: {}", parent.display()))?;
        }
        let mut writer = Writer::from_path(path)
            .with_context(|| format!("Failed to create mapping file: {}", path.display()))?;
        writer
            .write_record(MAPPING_HEADER)
            .context("Failed to write mapping header")?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }

    pub fn append(&mut self, record: &MappingRecord) -> Result<()> {
        let original = crate::path_to_string(&record.original_path);
        self.writer
            .write_record([record.filename.as_str(), original.as_str()])
            .with_context(|| format!("Failed to write mapping row to {}", self.path.display()))
    }

    /// Flush all rows to disk.
    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to write mapping file: {}", self.path.display()))
    }
}

/// Read every row of a mapping file, skipping a header row if present.
///
/// Malformed rows are returned as errors in place so the caller can count them.
pub fn read_mapping(path: &Path) -> Result<Vec<Result<MappingRecord, ItemError>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open mapping file: {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row_number = index + 1;
        let record = match row {
            Ok(record) => record,
            Err(error) => {
                rows.push(Err(ItemError::Mapping {
                    row: row_number,
                    message: error.to_string(),
                }));
                continue;
            }
        };
        if index == 0 && record.get(0).is_some_and(|first| first.trim() == MAPPING_HEADER[0]) {
            continue;
        }
        let parsed = match (record.get(0), record.get(1)) {
            (Some(filename), Some(original)) if !filename.trim().is_empty() && !original.trim().is_empty() => {
                Ok(MappingRecord {
                    filename: filename.trim().to_string(),
                    original_path: PathBuf::from(original.trim()),
                })
            }
            _ => Err(ItemError::Mapping {
                row: row_number,
                message: "expected two non-empty columns".to_string(),
            }),
        };
        rows.push(parsed);
    }
    Ok(rows)
}
