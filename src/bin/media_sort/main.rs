mod config;
mod media_sort;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use media_tools::identifier::TitleRule;
use media_tools::tasks::FolderTag;

use crate::media_sort::MediaSort;

#[derive(Parser)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Match, replace and organize media files by their content identifier"
)]
pub(crate) struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable debug prints
    #[arg(short = 'D', long, global = true)]
    debug: bool,

    /// Delete files immediately instead of moving to trash
    #[arg(short = 'x', long, global = true)]
    delete: bool,

    /// Directory for the operation log and poster mapping file
    #[arg(short = 'L', long, value_hint = clap::ValueHint::DirPath, global = true)]
    log_dir: Option<PathBuf>,

    /// Only print changes without touching files
    #[arg(short = 'p', long, global = true)]
    print: bool,

    /// Create shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Print verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Move media files into type and year/month folders
    #[command(name = "organize")]
    Organize {
        /// Directory to collect media files from, searched recursively
        #[arg(value_hint = clap::ValueHint::DirPath)]
        source: PathBuf,

        /// Target root
        #[arg(value_hint = clap::ValueHint::DirPath)]
        target: PathBuf,

        /// Do not create a folder per media type
        #[arg(short = 'T', long)]
        no_type: bool,

        /// Do not create year and month folders
        #[arg(short = 'd', long)]
        no_date: bool,
    },

    /// Replace fanart and thumb images with larger covers from a repository
    #[command(name = "covers")]
    Covers {
        /// Cover repository, searched recursively
        #[arg(value_hint = clap::ValueHint::DirPath)]
        repo: PathBuf,

        /// Library root containing the images to replace
        #[arg(value_hint = clap::ValueHint::DirPath)]
        target: PathBuf,
    },

    /// Copy matching subtitles next to videos
    #[command(name = "subtitles")]
    Subtitles {
        /// Video library root
        #[arg(value_hint = clap::ValueHint::DirPath)]
        videos: PathBuf,

        /// Subtitle root
        #[arg(value_hint = clap::ValueHint::DirPath)]
        subtitles: PathBuf,

        /// Subtitle directory under the subtitle root to search first, in order
        #[arg(short = 'P', long, num_args = 1, action = clap::ArgAction::Append, name = "DIR")]
        priority: Vec<String>,
    },

    /// Rename compact subtitles like `abc00123.srt` to `ABC-123.srt`
    #[command(name = "sub-rename")]
    SubRename {
        /// Subtitle root
        #[arg(value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,
    },

    /// Move books into version groups by title
    #[command(name = "books")]
    Books {
        /// Directory with incoming books
        #[arg(value_hint = clap::ValueHint::DirPath)]
        source: PathBuf,

        /// Library directory with one folder per title
        #[arg(value_hint = clap::ValueHint::DirPath)]
        target: PathBuf,

        /// How the title is derived from the file name
        #[arg(short = 'r', long, value_enum, default_value_t = TitleRule::Code)]
        rule: TitleRule,
    },

    /// Copy posters into a working directory for enhancement
    #[command(name = "poster-export")]
    PosterExport {
        /// Library root to collect posters from
        #[arg(value_hint = clap::ValueHint::DirPath)]
        source: PathBuf,

        /// Working directory
        #[arg(value_hint = clap::ValueHint::DirPath)]
        work_dir: PathBuf,

        /// Start the configured image enhancer afterwards
        #[arg(short = 'e', long)]
        enhance: bool,
    },

    /// Copy enhanced posters back to their original locations
    #[command(name = "poster-import")]
    PosterImport {
        /// Working directory
        #[arg(value_hint = clap::ValueHint::DirPath)]
        work_dir: PathBuf,
    },

    /// Overwrite posters with images from a flat source directory
    #[command(name = "poster-replace")]
    PosterReplace {
        /// Library root containing the posters
        #[arg(value_hint = clap::ValueHint::DirPath)]
        output: PathBuf,

        /// Directory with replacement images
        #[arg(value_hint = clap::ValueHint::DirPath)]
        images: PathBuf,
    },

    /// Rename videos to their identifier with a suffix
    #[command(name = "video-rename")]
    VideoRename {
        /// Video directory
        #[arg(value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,

        /// Suffix added after the identifier
        #[arg(short = 's', long, default_value = "-4K", allow_hyphen_values = true)]
        suffix: String,
    },

    /// Add a release tag to folder names
    #[command(name = "folder-tag")]
    FolderTag {
        /// Directory containing the folders
        #[arg(value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,

        /// Tag to add
        #[arg(short = 't', long, value_enum)]
        tag: FolderTag,
    },

    /// Move folders with a descriptor into maker and series folders
    #[command(name = "maker")]
    Maker {
        /// Root to search for descriptor folders
        #[arg(value_hint = clap::ValueHint::DirPath)]
        source: PathBuf,

        /// Destination root
        #[arg(value_hint = clap::ValueHint::DirPath)]
        destination: PathBuf,
    },

    /// Group `Name - Title` folders under a folder per name
    #[command(name = "series")]
    Series {
        #[arg(value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,
    },

    /// Group folders into first letter marker folders
    #[command(name = "letters")]
    Letters {
        #[arg(value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,
    },

    /// Extract archives and collect ed2k links from text files
    #[command(name = "ed2k")]
    Ed2k {
        /// Download directory
        #[arg(value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,

        /// Directory for the collected link file
        #[arg(short = 'o', long, value_hint = clap::ValueHint::DirPath)]
        output: Option<PathBuf>,

        /// Keep text files after their links were collected
        #[arg(short = 'k', long)]
        keep: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(ref shell) = args.completion {
        media_tools::generate_shell_completion(*shell, Args::command(), true, env!("CARGO_BIN_NAME"))
    } else if args.command.is_none() {
        Args::command().print_help()?;
        Ok(())
    } else {
        MediaSort::run_with_args(args)
    }
}
