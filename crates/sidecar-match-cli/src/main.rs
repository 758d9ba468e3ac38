use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sidecar_match_core::{ProcessOptions, ProgressSink};

#[derive(Parser)]
#[command(name = "sidecar-match", version, about = "Google Photos Takeout Helper - match JSON sidecars to their media and restore EXIF")]
struct Cli {
    /// Directory with media files and their JSON sidecars
    #[arg(required_unless_present = "options")]
    input: Option<PathBuf>,

    /// Load processing options from a JSON file instead of flags
    #[arg(long, conflicts_with = "input")]
    options: Option<PathBuf>,

    /// Suffix Google added to edited copies (default "-editado")
    #[arg(long)]
    edited_suffix: Option<String>,

    /// Output folder for matched media, inside the input directory
    #[arg(long, default_value = "Matched")]
    matched_dir: String,

    /// Folder for originals of edited media, inside the input directory
    #[arg(long, default_value = "Originals")]
    originals_dir: String,

    /// Write capture time as UTC instead of local time at the GPS position
    #[arg(long)]
    no_timezone: bool,

    /// Leave the ModifyDate tag alone
    #[arg(long)]
    no_modify_date: bool,

    /// Do not set file modification times to the capture time
    #[arg(long)]
    keep_file_times: bool,

    /// Highest (N) tried when looking for numbered duplicates
    #[arg(long, default_value_t = 10_000)]
    max_duplicate_probe: u32,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn to_options(&self) -> anyhow::Result<ProcessOptions> {
        if let Some(path) = &self.options {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("Invalid options file {}", path.display()));
        }

        let input = self
            .input
            .clone()
            .context("an input directory is required")?;
        let mut options = ProcessOptions::new(input);
        options.edited_suffix = self.edited_suffix.clone();
        options.matched_dir_name = self.matched_dir.clone();
        options.originals_dir_name = self.originals_dir.clone();
        options.resolve_timezone = !self.no_timezone;
        options.write_modify_date = !self.no_modify_date;
        options.set_file_times = !self.keep_file_times;
        options.max_duplicate_probe = self.max_duplicate_probe;
        Ok(options)
    }
}

/// Percentages are shown with two decimals, so the bar counts hundredths.
struct BarSink(ProgressBar);

impl BarSink {
    fn new() -> Self {
        let pb = ProgressBar::new(100 * 100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40}] {msg}")
                .unwrap(),
        );
        Self(pb)
    }
}

impl ProgressSink for BarSink {
    fn on_progress(&self, percent: f64) {
        self.0.set_position((percent * 100.0).round() as u64);
        self.0.set_message(format!("{percent:.2}%"));
    }

    fn on_complete(&self, successes: u64, errors: u64) {
        let s = if successes == 1 { "success" } else { "successes" };
        let e = if errors == 1 { "error" } else { "errors" };
        self.0.finish_with_message(format!(
            "Matching process finished with {successes} {s} and {errors} {e}."
        ));
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let options = cli.to_options()?;
    let t_total = std::time::Instant::now();

    let sink = BarSink::new();
    let result = sidecar_match_core::process(&options, &sink)?;

    eprintln!(
        "Done! {} sidecars, {} matched, {} failed ({:.2}s)",
        result.total_sidecars,
        result.successes,
        result.errors,
        t_total.elapsed().as_secs_f64()
    );
    for failure in &result.failures {
        log::debug!("{:?} {}: {}", failure.kind, failure.sidecar, failure.message);
    }

    Ok(())
}
