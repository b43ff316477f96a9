use std::fs;

use anyhow::Context;
use itertools::Itertools;
use serde::Deserialize;

use media_tools::EngineConfig;
use media_tools::config::CONFIG_PATH;

use crate::{Args, Command};

/// Config from the user config file.
///
/// Engine settings sit directly in the `[mediasort]` section next to the CLI defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaSortConfig {
    debug: bool,
    verbose: bool,
    /// Subtitle directories searched before the subtitle root, in order.
    subtitle_priority_dirs: Vec<String>,
    #[serde(flatten)]
    engine: EngineConfig,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    mediasort: MediaSortConfig,
}

/// Final config created from CLI arguments and user config file.
#[derive(Debug, Default)]
pub struct Config {
    pub(crate) debug: bool,
    pub(crate) verbose: bool,
    pub(crate) subtitle_priority_dirs: Vec<String>,
    pub(crate) engine: EngineConfig,
}

impl MediaSortConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    fn get_user_config() -> anyhow::Result<Self> {
        let Some(path) = CONFIG_PATH.as_deref() else {
            return Ok(Self::default());
        };

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file {}:\n{e}", path.display())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {error}",
                path.display()
            )),
        }
    }

    /// Parse config from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.mediasort)
            .context("Failed to parse mediasort config TOML")
    }
}

impl Config {
    /// Create config from given command line args and user config file.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or parsed.
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let user_config = MediaSortConfig::get_user_config()?;
        Ok(Self::from_args_and_user_config(args, user_config))
    }

    fn from_args_and_user_config(args: &Args, user_config: MediaSortConfig) -> Self {
        let cli_priority: &[String] = match &args.command {
            Some(Command::Subtitles { priority, .. }) => priority,
            _ => &[],
        };
        // CLI directories are searched first
        let subtitle_priority_dirs = cli_priority
            .iter()
            .chain(&user_config.subtitle_priority_dirs)
            .map(|dir| dir.trim().to_string())
            .filter(|dir| !dir.is_empty())
            .unique()
            .collect();

        let mut engine = user_config.engine;
        engine.dryrun |= args.print;
        engine.delete_permanently |= args.delete;
        if let Some(log_dir) = &args.log_dir {
            engine.log_dir.clone_from(log_dir);
        }

        Self {
            debug: args.debug || user_config.debug,
            verbose: args.verbose || user_config.verbose,
            subtitle_priority_dirs,
            engine,
        }
    }
}

#[cfg(test)]
mod mediasort_config_tests {
    use super::*;

    #[test]
    fn from_toml_str_parses_empty_config() {
        let config = MediaSortConfig::from_toml_str("").expect("should parse empty config");
        assert!(!config.debug);
        assert!(!config.verbose);
        assert!(config.subtitle_priority_dirs.is_empty());
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn from_toml_str_parses_engine_settings_in_section() {
        let toml = r#"
[mediasort]
verbose = true
dryrun = true
subtitle_priority_dirs = ["fixed", "official"]
image_extensions = ["jpg", "png"]
poster_keyword = "cover"
archive_tool = "/opt/bin/extract"
"#;
        let config = MediaSortConfig::from_toml_str(toml).expect("should parse config");
        assert!(config.verbose);
        assert!(config.engine.dryrun);
        assert_eq!(config.subtitle_priority_dirs, vec!["fixed", "official"]);
        assert_eq!(config.engine.image_extensions, vec!["jpg", "png"]);
        assert_eq!(config.engine.poster_keyword, "cover");
        assert_eq!(
            config.engine.archive_tool.as_deref(),
            Some(std::path::Path::new("/opt/bin/extract"))
        );
    }

    #[test]
    fn from_toml_str_ignores_other_sections() {
        let toml = r"
[dots]
verbose = true

[mediasort]
debug = true
";
        let config = MediaSortConfig::from_toml_str(toml).expect("should parse config");
        assert!(config.debug);
        assert!(!config.verbose);
    }

    #[test]
    fn from_toml_str_invalid_toml_returns_error() {
        assert!(MediaSortConfig::from_toml_str("this is not valid toml {{{").is_err());
    }
}

#[cfg(test)]
mod config_from_args_tests {
    use super::*;

    use std::path::PathBuf;

    fn default_args() -> Args {
        Args {
            command: None,
            debug: false,
            delete: false,
            log_dir: None,
            print: false,
            completion: None,
            verbose: false,
        }
    }

    #[test]
    fn cli_flags_override_user_config() {
        let mut args = default_args();
        args.print = true;
        args.delete = true;
        args.verbose = true;
        args.log_dir = Some(PathBuf::from("/tmp/mediasort-logs"));

        let config = Config::from_args_and_user_config(&args, MediaSortConfig::default());
        assert!(config.engine.dryrun);
        assert!(config.engine.delete_permanently);
        assert!(config.verbose);
        assert!(!config.debug);
        assert_eq!(config.engine.log_dir, PathBuf::from("/tmp/mediasort-logs"));
    }

    #[test]
    fn priority_dirs_merge_cli_first_without_duplicates() {
        let mut args = default_args();
        args.command = Some(Command::Subtitles {
            videos: PathBuf::from("videos"),
            subtitles: PathBuf::from("subs"),
            priority: vec!["official".to_string(), " fixed ".to_string()],
        });
        let user_config = MediaSortConfig {
            subtitle_priority_dirs: vec!["fixed".to_string(), "archive".to_string()],
            ..MediaSortConfig::default()
        };

        let config = Config::from_args_and_user_config(&args, user_config);
        assert_eq!(config.subtitle_priority_dirs, vec!["official", "fixed", "archive"]);
    }

    #[test]
    fn user_config_flags_are_kept_without_cli_flags() {
        let user_config = MediaSortConfig {
            debug: true,
            engine: EngineConfig {
                dryrun: true,
                ..EngineConfig::default()
            },
            ..MediaSortConfig::default()
        };
        let config = Config::from_args_and_user_config(&default_args(), user_config);
        assert!(config.debug);
        assert!(config.engine.dryrun);
    }
}
