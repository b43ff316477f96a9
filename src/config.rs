//! Engine configuration.
//!
//! The engine never reads ambient state: everything it needs is in [`EngineConfig`],
//! passed in once at construction.

use std::path::PathBuf;
use std::sync::LazyLock;

use serde::Deserialize;

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Path to the user config file: `$HOME/.config/media-tools.toml`
///
/// Returns `None` if the home directory cannot be determined.
pub static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}.toml")))
});

pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "ts", "mov", "webm", "wmv", "flv"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "wma"];
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "rtf"];
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt"];
pub const ARCHIVE_EXTENSIONS: &[&str] = &["rar", "zip", "7z"];

/// Richer subtitle formats first.
pub const SUBTITLE_PREFERENCE: &[&str] = &["ass", "srt"];
pub const SUBTITLE_LANGUAGE_TAGS: &[&str] = &["chs", "sc", "zh", "cn", "simp"];
pub const COVER_TARGET_SUFFIXES: &[&str] = &["-fanart", "-thumb"];

const DEFAULT_LOG_FILE_NAME: &str = "operations.log";
const DEFAULT_MAPPING_FILE_NAME: &str = "poster_mapping.csv";
const DEFAULT_PASSWORD_FILE_NAME: &str = "解壓密碼.txt";
const DEFAULT_ED2K_HEADER: &str = "115視頻格式離綫下載地址：";

/// Immutable engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub video_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
    pub audio_extensions: Vec<String>,
    pub document_extensions: Vec<String>,
    pub subtitle_extensions: Vec<String>,
    /// Subtitle extensions in order of preference when choosing between candidates.
    pub subtitle_preference: Vec<String>,
    /// Videos whose name contains any of these are never given subtitles.
    pub subtitle_exclude_keywords: Vec<String>,
    /// Stems already ending in `.<tag>` are not tagged again.
    pub subtitle_language_tags: Vec<String>,
    pub subtitle_language_tag: String,
    /// Image stems with one of these suffixes are cover replacement targets.
    pub cover_target_suffixes: Vec<String>,
    pub poster_keyword: String,
    pub log_dir: PathBuf,
    pub log_file_name: String,
    pub mapping_file_name: String,
    /// Archive extractor, either a full path or a program name looked up from `PATH`.
    pub archive_tool: Option<PathBuf>,
    pub archive_extensions: Vec<String>,
    pub archive_password_file: String,
    pub ed2k_header: String,
    pub enhancer_path: Option<PathBuf>,
    pub dryrun: bool,
    /// Remove files for good instead of moving them to trash.
    pub delete_permanently: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            video_extensions: to_strings(VIDEO_EXTENSIONS),
            image_extensions: to_strings(IMAGE_EXTENSIONS),
            audio_extensions: to_strings(AUDIO_EXTENSIONS),
            document_extensions: to_strings(DOCUMENT_EXTENSIONS),
            subtitle_extensions: to_strings(SUBTITLE_EXTENSIONS),
            subtitle_preference: to_strings(SUBTITLE_PREFERENCE),
            subtitle_exclude_keywords: vec!["trailer".to_string()],
            subtitle_language_tags: to_strings(SUBTITLE_LANGUAGE_TAGS),
            subtitle_language_tag: "chs".to_string(),
            cover_target_suffixes: to_strings(COVER_TARGET_SUFFIXES),
            poster_keyword: "poster".to_string(),
            log_dir: default_log_dir(),
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            mapping_file_name: DEFAULT_MAPPING_FILE_NAME.to_string(),
            archive_tool: Some(PathBuf::from("bandizip")),
            archive_extensions: to_strings(ARCHIVE_EXTENSIONS),
            archive_password_file: DEFAULT_PASSWORD_FILE_NAME.to_string(),
            ed2k_header: DEFAULT_ED2K_HEADER.to_string(),
            enhancer_path: None,
            dryrun: false,
            delete_permanently: false,
        }
    }
}

impl EngineConfig {
    /// Lowercase extensions and keywords and drop leading dots,
    /// so that user supplied values compare equal to scanned ones.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.video_extensions,
            &mut self.image_extensions,
            &mut self.audio_extensions,
            &mut self.document_extensions,
            &mut self.subtitle_extensions,
            &mut self.subtitle_preference,
            &mut self.subtitle_language_tags,
            &mut self.archive_extensions,
        ] {
            *list = list.iter().map(|value| normalize_extension(value)).collect();
        }
        self.subtitle_exclude_keywords = lowercase_all(&self.subtitle_exclude_keywords);
        self.cover_target_suffixes = lowercase_all(&self.cover_target_suffixes);
        self.subtitle_language_tag = normalize_extension(&self.subtitle_language_tag);
        self.poster_keyword = self.poster_keyword.to_lowercase();
        self
    }

    /// Full path of the operation log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file_name)
    }

    /// Full path of the poster mapping file.
    #[must_use]
    pub fn mapping_path(&self) -> PathBuf {
        self.log_dir.join(&self.mapping_file_name)
    }
}

/// Lowercase without leading dot: `.MKV` -> `mkv`.
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|value| value.to_lowercase()).collect()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|&value| value.to_string()).collect()
}

/// `$HOME/logs/media-tools`, or a relative `logs` directory without a home directory.
fn default_log_dir() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from("logs"),
        |home| home.join("logs").join(PROJECT_NAME),
    )
}

#[cfg(test)]
mod engine_config_tests {
    use super::*;

    #[test]
    fn default_config_has_expected_lists() {
        let config = EngineConfig::default();
        assert!(config.video_extensions.contains(&"mkv".to_string()));
        assert_eq!(config.subtitle_preference, vec!["ass", "srt"]);
        assert_eq!(config.cover_target_suffixes, vec!["-fanart", "-thumb"]);
        assert!(!config.dryrun);
    }

    #[test]
    fn normalized_lowercases_and_strips_dots() {
        let config = EngineConfig {
            video_extensions: vec![".MKV".to_string(), "Mp4".to_string()],
            subtitle_language_tag: ".CHS".to_string(),
            cover_target_suffixes: vec!["-FanArt".to_string()],
            ..EngineConfig::default()
        }
        .normalized();
        assert_eq!(config.video_extensions, vec!["mkv", "mp4"]);
        assert_eq!(config.subtitle_language_tag, "chs");
        assert_eq!(config.cover_target_suffixes, vec!["-fanart"]);
    }

    #[test]
    fn deserializes_partial_config_with_defaults() {
        let toml = r#"
image_extensions = ["jpg"]
dryrun = true
log_dir = "/tmp/media-logs"
"#;
        let config: EngineConfig = toml::from_str(toml).expect("should parse engine config");
        assert_eq!(config.image_extensions, vec!["jpg"]);
        assert!(config.dryrun);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/media-logs"));
        assert_eq!(config.subtitle_extensions, EngineConfig::default().subtitle_extensions);
        assert_eq!(config.mapping_path(), PathBuf::from("/tmp/media-logs/poster_mapping.csv"));
    }
}
