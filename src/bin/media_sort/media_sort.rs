use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use media_tools::tasks::OrganizeLayout;
use media_tools::{BatchReport, Callbacks, MediaEngine, print_bold, print_error, print_warning};

use crate::config::Config;
use crate::{Args, Command};

const PROGRESS_BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:80.magenta/blue} {pos:>3}%";
const PROGRESS_BAR_CHARS: &str = "=>-";

pub struct MediaSort {
    command: Command,
    config: Config,
}

impl MediaSort {
    /// Run the selected subcommand with the given args and user config.
    pub fn run_with_args(mut args: Args) -> Result<()> {
        let config = Config::from_args(&args)?;
        let command = args.command.take().context("No command given")?;
        Self { command, config }.run()
    }

    fn run(self) -> Result<()> {
        if self.config.debug {
            println!("{:#?}", self.config);
        }

        let progress_bar = ProgressBar::new(100);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_BAR_TEMPLATE)?
                .progress_chars(PROGRESS_BAR_CHARS),
        );

        let mut callbacks = Callbacks::new().on_progress({
            let progress_bar = progress_bar.clone();
            move |percent| progress_bar.set_position(u64::from(percent))
        });
        if self.config.verbose {
            let progress_bar = progress_bar.clone();
            callbacks = callbacks.on_notify(move |message| progress_bar.println(message));
        }

        let engine = MediaEngine::new(self.config.engine.clone(), callbacks)?
            .with_cancel_flag(install_abort_handler());
        if engine.config().dryrun {
            print_bold!("Dryrun: nothing is changed on disk");
        }

        let report = self.dispatch(&engine);
        progress_bar.finish_and_clear();
        let report = report?;

        if report.cancelled {
            println!("\n{}", "Aborted by user".bold().red());
        }
        print_summary(&report);
        if report.tally.failed > 0 {
            print_error!(
                "{} operations failed, see {}",
                report.tally.failed,
                engine.config().log_path().display()
            );
        } else if self.config.verbose {
            println!("Log: {}", engine.config().log_path().display());
        }
        Ok(())
    }

    fn dispatch(&self, engine: &MediaEngine) -> Result<BatchReport> {
        match &self.command {
            Command::Organize {
                source,
                target,
                no_type,
                no_date,
            } => engine.organize_by_type_and_date(
                &resolve(source)?,
                &absolute(target)?,
                OrganizeLayout {
                    by_type: !*no_type,
                    by_date: !*no_date,
                },
            ),
            Command::Covers { repo, target } => engine.replace_covers_by_size(&resolve(repo)?, &resolve(target)?),
            Command::Subtitles { videos, subtitles, .. } => engine.match_subtitles(
                &resolve(videos)?,
                &resolve(subtitles)?,
                &self.config.subtitle_priority_dirs,
            ),
            Command::SubRename { path } => engine.rename_subtitles_to_canonical(&resolve(path)?),
            Command::Books { source, target, rule } => engine.organize_books(&resolve(source)?, &absolute(target)?, *rule),
            Command::PosterExport {
                source,
                work_dir,
                enhance,
            } => engine.export_posters(&resolve(source)?, &absolute(work_dir)?, *enhance),
            Command::PosterImport { work_dir } => engine.import_posters(&resolve(work_dir)?),
            Command::PosterReplace { output, images } => {
                engine.replace_posters_from_source(&resolve(output)?, &resolve(images)?)
            }
            Command::VideoRename { path, suffix } => engine.rename_videos_with_suffix(&resolve(path)?, suffix),
            Command::FolderTag { path, tag } => engine.tag_folders(&resolve(path)?, *tag),
            Command::Maker { source, destination } => {
                engine.organize_by_maker(&resolve(source)?, &absolute(destination)?)
            }
            Command::Series { path } => engine.group_by_series(&resolve(path)?),
            Command::Letters { path } => engine.group_by_first_letter(&resolve(path)?),
            Command::Ed2k { path, output, keep } => {
                let base = resolve(path)?;
                let output = match output {
                    Some(output) => absolute(output)?,
                    None => base.clone(),
                };
                engine.extract_ed2k(&base, &output, !*keep)
            }
        }
    }
}

/// Existing input path as an absolute path.
fn resolve(path: &Path) -> Result<PathBuf> {
    media_tools::resolve_input_path(Some(path))
}

/// Output path that may not exist yet.
fn absolute(path: &Path) -> Result<PathBuf> {
    media_tools::resolve_output_path(path)
}

/// Set up Ctrl+C handling: the first press stops after the current item, the second exits.
fn install_abort_handler() -> Arc<AtomicBool> {
    let abort_flag = Arc::new(AtomicBool::new(false));
    let abort_flag_handler = Arc::clone(&abort_flag);

    if let Err(error) = ctrlc::set_handler(move || {
        if abort_flag_handler.load(Ordering::SeqCst) {
            // Second Ctrl+C - force exit
            std::process::exit(130);
        }
        println!("\n{}", "Received Ctrl+C, finishing current item...".yellow().bold());
        abort_flag_handler.store(true, Ordering::SeqCst);
    }) {
        print_warning!("Failed to set Ctrl+C handler: {error}");
    }
    abort_flag
}

fn print_summary(report: &BatchReport) {
    let tally = &report.tally;
    println!("{}", "Summary".bold());
    println!("  {:<8} {}", "applied", tally.applied.to_string().green());
    if tally.planned > 0 {
        println!("  {:<8} {}", "planned", tally.planned.to_string().cyan());
    }
    println!("  {:<8} {}", "skipped", tally.skipped.to_string().yellow());
    for (reason, count) in &tally.skip_reasons {
        println!("    {:<18} {count}", reason.to_string());
    }
    let failed = tally.failed.to_string();
    if tally.failed > 0 {
        println!("  {:<8} {}", "failed", failed.red().bold());
    } else {
        println!("  {:<8} {failed}", "failed");
    }
}
