use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use pinyin::ToPinyin;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::engine::{BatchReport, MediaEngine, ensure_directory};
use crate::executor::{Action, Guard, SkipReason};
use crate::identifier;
use crate::scanner::{self, TreeScanner};

static RE_MAKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<maker(?:\s[^>]*)?>(.*?)</maker>").expect("Invalid maker regex"));

static RE_STUDIO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<studio(?:\s[^>]*)?>(.*?)</studio>").expect("Invalid studio regex"));

static RE_CDATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("Invalid CDATA regex"));

/// Named and numeric character references.
static RE_XML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#([0-9]+)|#[xX]([0-9A-Fa-f]+)|(lt|gt|quot|apos|amp));").expect("Invalid XML entity regex")
});

static RE_INVALID_PATH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("Invalid path character regex"));

/// `【A】` style marker folders created by [`MediaEngine::group_by_first_letter`].
static RE_MARKER_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^【[A-Z0-9#]】$").expect("Invalid marker folder regex"));

const SERIES_SEPARATOR: &str = " - ";

impl MediaEngine {
    /// Move every folder with a `.nfo` descriptor under `source_root`
    /// to `dest_root/【maker】/【SERIES】/<folder>`.
    ///
    /// Only the outermost descriptor folders are moved. Folders without a readable maker are skipped.
    pub fn organize_by_maker(&self, source_root: &Path, dest_root: &Path) -> Result<BatchReport> {
        ensure_directory(source_root, "Source root")?;
        let folders = descriptor_folders(source_root, dest_root);

        Ok(self.run_batch("maker", &folders, |folder, tally| {
            let Some(maker) = read_maker(folder) else {
                self.skip(tally, SkipReason::NoMetadata, folder);
                return;
            };
            let name = crate::path_to_filename_string(folder);
            let mut parent = dest_root.join(format!("【{maker}】"));
            if let Some(id) = identifier::extract(&name) {
                parent.push(format!("【{}】", id.series()));
            }
            self.apply(
                &Action::Move {
                    source: folder.clone(),
                    destination: parent.join(name),
                    guard: Guard::DestinationAbsent,
                },
                tally,
            );
        }))
    }

    /// Move second level folders named `Name - Title` into `root/Name/`.
    pub fn group_by_series(&self, root: &Path) -> Result<BatchReport> {
        ensure_directory(root, "Root")?;
        let mut folders = Vec::new();
        for top in scanner::child_directories(root).with_context(|| format!("Failed to list {}", root.display()))? {
            match scanner::child_directories(&top) {
                Ok(children) => folders.extend(
                    children
                        .into_iter()
                        .filter(|child| crate::path_to_filename_string(child).contains(SERIES_SEPARATOR)),
                ),
                Err(error) => self.notify(&format!("Failed to list {}: {error}", top.display())),
            }
        }

        Ok(self.run_batch("series", &folders, |folder, tally| {
            let name = crate::path_to_filename_string(folder);
            let series = name.split(SERIES_SEPARATOR).next().unwrap_or_default().trim();
            if series.is_empty() {
                self.skip(tally, SkipReason::NoIdentifier, folder);
                return;
            }
            self.apply(
                &Action::Move {
                    source: folder.clone(),
                    destination: root.join(series).join(&name),
                    guard: Guard::DestinationAbsent,
                },
                tally,
            );
        }))
    }

    /// Move top level folders into `【X】` marker folders by the first letter of their name.
    ///
    /// Accented letters are folded to their base letter and Chinese characters use their pinyin initial.
    /// Anything else goes to `【#】`.
    pub fn group_by_first_letter(&self, root: &Path) -> Result<BatchReport> {
        ensure_directory(root, "Root")?;
        let folders: Vec<PathBuf> = scanner::child_directories(root)
            .with_context(|| format!("Failed to list {}", root.display()))?
            .into_iter()
            .filter(|folder| !RE_MARKER_FOLDER.is_match(&crate::path_to_filename_string(folder)))
            .collect();

        Ok(self.run_batch("letters", &folders, |folder, tally| {
            let name = crate::path_to_filename_string(folder);
            let marker = format!("【{}】", first_letter(&name));
            self.apply(
                &Action::Move {
                    source: folder.clone(),
                    destination: root.join(marker).join(&name),
                    guard: Guard::DestinationAbsent,
                },
                tally,
            );
        }))
    }
}

/// Outermost folders under `root` that directly contain a `.nfo` file, excluding `root` and `exclude`.
fn descriptor_folders(root: &Path, exclude: &Path) -> Vec<PathBuf> {
    let mut folders = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().starts_with(exclude) {
            walker.skip_current_dir();
            continue;
        }
        if has_descriptor(entry.path()) {
            folders.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    folders
}

fn has_descriptor(folder: &Path) -> bool {
    TreeScanner::new().extensions(["nfo"]).scan(folder).next().is_some()
}

/// Maker name from the first descriptor in the folder, falling back to the studio.
///
/// Elements may carry attributes and wrap their text in CDATA.
fn read_maker(folder: &Path) -> Option<String> {
    let descriptor = TreeScanner::new().extensions(["nfo"]).scan(folder).next()?;
    let bytes = fs::read(&descriptor.path).ok()?;
    let content = String::from_utf8_lossy(&bytes);
    [&RE_MAKER, &RE_STUDIO].into_iter().find_map(|pattern| {
        let value = element_text(pattern.captures(&content)?.get(1)?.as_str());
        let value = RE_INVALID_PATH_CHARS.replace_all(value.trim(), "_").to_string();
        (!value.is_empty()).then_some(value)
    })
}

/// Element content with CDATA sections unwrapped and entities outside them resolved.
fn element_text(raw: &str) -> String {
    let mut text = String::new();
    let mut last = 0;
    for cdata in RE_CDATA.captures_iter(raw) {
        let (Some(whole), Some(inner)) = (cdata.get(0), cdata.get(1)) else {
            continue;
        };
        text.push_str(&unescape_xml(&raw[last..whole.start()]));
        text.push_str(inner.as_str());
        last = whole.end();
    }
    text.push_str(&unescape_xml(&raw[last..]));
    text.trim().to_string()
}

fn unescape_xml(text: &str) -> String {
    RE_XML_ENTITY
        .replace_all(text, |caps: &Captures| {
            let code = caps
                .get(1)
                .and_then(|decimal| decimal.as_str().parse::<u32>().ok())
                .or_else(|| caps.get(2).and_then(|hex| u32::from_str_radix(hex.as_str(), 16).ok()));
            if let Some(code) = code {
                return char::from_u32(code).map_or_else(String::new, String::from);
            }
            match caps.get(3).map(|name| name.as_str()) {
                Some("lt") => "<",
                Some("gt") => ">",
                Some("quot") => "\"",
                Some("apos") => "'",
                _ => "&",
            }
            .to_string()
        })
        .into_owned()
}

/// Upper-case first letter: Latin with accents removed, the pinyin initial for Chinese, or `#`.
fn first_letter(name: &str) -> char {
    let Some(first) = name.trim().chars().next() else {
        return '#';
    };
    if let Some(pinyin) = first.to_pinyin() {
        return pinyin
            .first_letter()
            .chars()
            .next()
            .filter(char::is_ascii_alphabetic)
            .map_or('#', |letter| letter.to_ascii_uppercase());
    }
    first
        .nfd()
        .next()
        .filter(char::is_ascii_alphabetic)
        .map_or('#', |letter| letter.to_ascii_uppercase())
}
