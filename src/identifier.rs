//! Filename grammars.
//!
//! Every rule for reading structure out of a free-form file name lives here:
//! the canonical content identifier used as the join key across directory trees,
//! the compact content id form found in some subtitle releases,
//! and the title rules used to group book archives.

use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Canonical identifier: alphanumeric groups joined by hyphens, ending in a numeric group.
///
/// Written with explicit ASCII classes so that Unicode case folding
/// or non-ASCII digits can never become part of an identifier.
static RE_CANONICAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9]+(?:-[A-Za-z0-9]+)*-[0-9]+").expect("Invalid canonical id regex")
});

/// Compact content id: a letter label directly followed by digits, like `abc00123`.
static RE_COMPACT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]+)([0-9]+)").expect("Invalid compact id regex"));

/// `[tag]` and `【tag】` segments.
static RE_BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|【[^】]*】").expect("Invalid bracket regex"));

/// Release code at the start of a book name, like `ABC-12 `.
static RE_LEADING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9\-]+(?:\s+|$)").expect("Invalid leading code regex"));

/// Release version at the end of a book name, like ` 1.02`.
static RE_TRAILING_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[0-9]+\.[0-9]+\s*$").expect("Invalid trailing version regex"));

/// Version ordinal suffix of a stored book, like `-v2`.
static RE_VERSION_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-v([0-9]+)$").expect("Invalid version ordinal regex"));

/// Normalized content identifier, always upper-case, e.g. `ABC-123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalId(String);

/// How a book title is derived from its file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleRule {
    /// Strip a leading release code and a trailing version number
    #[default]
    Code,
    /// Strip bracketed tags and anything after the last one
    Bracket,
}

impl CanonicalId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The label group before the first hyphen: `ABC` for `ABC-123`.
    #[must_use]
    pub fn series(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// True when the file stem is the identifier itself,
    /// meaning the file covers the whole content item.
    #[must_use]
    pub fn is_whole_stem(&self, stem: &str) -> bool {
        stem.eq_ignore_ascii_case(&self.0)
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CanonicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the canonical identifier from a file name.
///
/// The longest identifier-shaped run wins, the leftmost one on equal length.
/// Decorations such as resolution, language or version tags are ignored
/// because they do not fit the pattern.
///
/// ```rust
/// use media_tools::identifier::extract;
///
/// assert_eq!(extract("[HD] abc-001-C.1080p.mkv").unwrap().as_str(), "ABC-001");
/// assert_eq!(extract("FC2-PPV-1234567.mp4").unwrap().as_str(), "FC2-PPV-1234567");
/// assert!(extract("holiday video.mp4").is_none());
/// ```
#[must_use]
pub fn extract(name: &str) -> Option<CanonicalId> {
    locate(name).map(|range| CanonicalId(name[range].to_ascii_uppercase()))
}

/// Byte range of the identifier inside the name, using the same rule as [`extract`].
#[must_use]
pub fn locate(name: &str) -> Option<Range<usize>> {
    RE_CANONICAL_ID
        .find_iter(name)
        .map(|m| m.range())
        .fold(None, |best: Option<Range<usize>>, range| match best {
            Some(best) if best.len() >= range.len() => Some(best),
            _ => Some(range),
        })
}

/// Insert `tag` right after the identifier in `stem`, or append it when there is none.
///
/// ```rust
/// use media_tools::identifier::insert_after_id;
///
/// assert_eq!(insert_after_id("abc-001-C", "-4K"), "abc-001-4K-C");
/// assert_eq!(insert_after_id("holiday", "-4K"), "holiday-4K");
/// ```
#[must_use]
pub fn insert_after_id(stem: &str, tag: &str) -> String {
    match locate(stem) {
        Some(range) => format!("{}{tag}{}", &stem[..range.end], &stem[range.end..]),
        None => format!("{stem}{tag}"),
    }
}

/// Convert a compact content id such as `abc00123` into canonical form `ABC-123`.
///
/// The last label-number run in the stem is used.
/// Labels shorter than two letters are rejected,
/// and the number is zero-padded to at least three digits.
#[must_use]
pub fn from_compact_form(stem: &str) -> Option<CanonicalId> {
    let captures = RE_COMPACT_ID.captures_iter(stem).last()?;
    let label = captures.get(1)?.as_str();
    if label.len() < 2 {
        return None;
    }
    let number = captures.get(2)?.as_str().trim_start_matches('0');
    Some(CanonicalId(format!("{}-{number:0>3}", label.to_ascii_uppercase())))
}

/// Derive the grouping title of a book from its file stem.
///
/// Falls back to the full stem when the rule leaves nothing.
#[must_use]
pub fn derive_title(stem: &str, rule: TitleRule) -> String {
    let title = match rule {
        TitleRule::Bracket => {
            let head = stem.rfind(']').map_or(stem, |index| &stem[..=index]);
            RE_BRACKETED.replace_all(head, "").trim().to_string()
        }
        TitleRule::Code => {
            let head = stem.find('[').map_or(stem, |index| &stem[..index]);
            let without_code = RE_LEADING_CODE.replace(head, "");
            RE_TRAILING_VERSION.replace(&without_code, "").trim().to_string()
        }
    };
    if title.is_empty() { stem.to_string() } else { title }
}

/// Version ordinal of a stem ending in `-v<N>`.
#[must_use]
pub fn version_ordinal(stem: &str) -> Option<u32> {
    RE_VERSION_ORDINAL.captures(stem)?.get(1)?.as_str().parse().ok()
}

/// Check if the stem already ends with one of the `.<tag>` language markers.
#[must_use]
pub fn has_language_tag(stem: &str, tags: &[String]) -> bool {
    let stem = stem.to_lowercase();
    tags.iter().any(|tag| {
        stem.strip_suffix(tag.as_str())
            .is_some_and(|rest| rest.ends_with('.'))
    })
}

#[cfg(test)]
mod identifier_tests {
    use super::*;

    fn id(name: &str) -> Option<String> {
        extract(name).map(|id| id.as_str().to_string())
    }

    #[test]
    fn extracts_simple_identifier() {
        assert_eq!(id("ABC-123.mkv").as_deref(), Some("ABC-123"));
        assert_eq!(id("abc-001.jpg").as_deref(), Some("ABC-001"));
    }

    #[test]
    fn ignores_decorations() {
        assert_eq!(id("ABC-001-fanart.jpg").as_deref(), Some("ABC-001"));
        assert_eq!(id("[1080p] ABC-001-C.chs.ass").as_deref(), Some("ABC-001"));
        assert_eq!(id("abc-001.x265.mp4").as_deref(), Some("ABC-001"));
    }

    #[test]
    fn keeps_multi_group_identifiers() {
        assert_eq!(id("fc2-ppv-1234567.mp4").as_deref(), Some("FC2-PPV-1234567"));
        assert_eq!(id("T28-559.mp4").as_deref(), Some("T28-559"));
    }

    #[test]
    fn prefers_longest_match() {
        assert_eq!(id("x1-2 ABCD-1234.mkv").as_deref(), Some("ABCD-1234"));
    }

    #[test]
    fn prefers_leftmost_on_equal_length() {
        assert_eq!(id("ABC-111 XYZ-222.mkv").as_deref(), Some("ABC-111"));
    }

    #[test]
    fn returns_none_without_identifier() {
        assert_eq!(id("holiday.mp4"), None);
        assert_eq!(id("ABC123.mp4"), None);
        assert_eq!(id("ABC-.mp4"), None);
        assert_eq!(id("-123.mp4"), None);
        assert_eq!(id(""), None);
    }

    #[test]
    fn ignores_non_ascii_digits() {
        assert_eq!(id("ABC-１２３.mp4"), None);
    }

    #[test]
    fn locate_returns_original_case_range() {
        let name = "my abc-001 clip";
        let range = locate(name).expect("should locate");
        assert_eq!(&name[range], "abc-001");
    }

    #[test]
    fn series_is_first_group() {
        let canonical = extract("ABC-123.mp4").expect("should extract");
        assert_eq!(canonical.series(), "ABC");
        let canonical = extract("FC2-PPV-123.mp4").expect("should extract");
        assert_eq!(canonical.series(), "FC2");
    }

    #[test]
    fn whole_stem_comparison_ignores_case() {
        let canonical = extract("ABC-123.mp4").expect("should extract");
        assert!(canonical.is_whole_stem("abc-123"));
        assert!(!canonical.is_whole_stem("abc-123-1"));
        assert!(!canonical.is_whole_stem("abc-123.chs"));
    }

    #[test]
    fn insert_after_id_keeps_surroundings() {
        assert_eq!(insert_after_id("[HD] abc-001 uncut", "-4K"), "[HD] abc-001-4K uncut");
    }

    #[test]
    fn compact_form_is_converted() {
        let canonical = |stem: &str| from_compact_form(stem).map(|id| id.as_str().to_string());
        assert_eq!(canonical("abc00123").as_deref(), Some("ABC-123"));
        assert_eq!(canonical("1abc00042").as_deref(), Some("ABC-042"));
        assert_eq!(canonical("h_123abc1234").as_deref(), Some("ABC-1234"));
        assert_eq!(canonical("abc000").as_deref(), Some("ABC-000"));
    }

    #[test]
    fn compact_form_rejects_short_labels_and_missing_numbers() {
        assert!(from_compact_form("a123").is_none());
        assert!(from_compact_form("abc").is_none());
        assert!(from_compact_form("ABC-123").is_none());
    }

    #[test]
    fn code_rule_strips_code_and_version() {
        assert_eq!(derive_title("ABC-12 My Book 1.02", TitleRule::Code), "My Book");
        assert_eq!(derive_title("ABC-12 My Book [Scan] [v2]", TitleRule::Code), "My Book");
        assert_eq!(derive_title("My Book", TitleRule::Code), "My Book");
    }

    #[test]
    fn code_rule_falls_back_to_stem() {
        assert_eq!(derive_title("ABC-12", TitleRule::Code), "ABC-12");
        assert_eq!(derive_title("[Only Tags]", TitleRule::Code), "[Only Tags]");
    }

    #[test]
    fn bracket_rule_strips_tags() {
        assert_eq!(derive_title("[Group] Title [Digital] extra", TitleRule::Bracket), "Title");
        assert_eq!(derive_title("【汉化】Title【完结】", TitleRule::Bracket), "Title");
        assert_eq!(derive_title("Plain Title", TitleRule::Bracket), "Plain Title");
    }

    #[test]
    fn bracket_rule_falls_back_to_stem() {
        assert_eq!(derive_title("[Group]Title", TitleRule::Bracket), "[Group]Title");
    }

    #[test]
    fn version_ordinal_is_parsed() {
        assert_eq!(version_ordinal("My Book-v1"), Some(1));
        assert_eq!(version_ordinal("My Book-v12"), Some(12));
        assert_eq!(version_ordinal("My Book"), None);
        assert_eq!(version_ordinal("My Book-v1 extra"), None);
    }

    #[test]
    fn language_tag_detection() {
        let tags = vec!["chs".to_string(), "zh".to_string()];
        assert!(has_language_tag("ABC-001.chs", &tags));
        assert!(has_language_tag("ABC-001.ZH", &tags));
        assert!(!has_language_tag("ABC-001", &tags));
        assert!(!has_language_tag("ABC-001chs", &tags));
    }
}
