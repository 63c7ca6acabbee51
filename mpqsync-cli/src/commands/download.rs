//! Download command: fetch outdated files into the staging directory.

use std::io;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use mpqsync::download::{download_all, DownloadConfig, ProgressEvent, DEFAULT_WORKERS};
use mpqsync::manifest::{Category, ManifestEntry};
use mpqsync::verify::{load_report, ReportError};

use super::common::Environment;
use crate::error::CliError;

/// Arguments for the download command.
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Number of parallel download workers
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Skip digest verification of downloaded files
    #[arg(long)]
    pub no_verify: bool,

    /// Download every manifest entry instead of the outdated set
    #[arg(short, long)]
    pub all: bool,

    /// With --all, also download loose .mpq container files
    #[arg(long)]
    pub include_mpq: bool,
}

/// Run the download command.
pub fn run(env: &Environment, args: &DownloadArgs) -> Result<(), CliError> {
    let entries = if args.all {
        all_entries(env, args.include_mpq)?
    } else {
        outdated_from_report(env)?
    };

    if entries.is_empty() {
        println!("{}", style("All files are up to date.").green());
        return Ok(());
    }

    println!(
        "Downloading {} files to {}",
        entries.len(),
        env.download_dir.display()
    );

    let config = DownloadConfig::default()
        .with_workers(args.workers)
        .with_verify(!args.no_verify);
    let plan = env.mirror_plan();
    let state = env.state_store();

    let bar = ProgressBar::new(entries.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress template is valid")
            .progress_chars("=>-"),
    );
    let mut on_progress = |event: &ProgressEvent<'_>| {
        bar.set_position(event.completed as u64);
        bar.set_message(event.name.to_string());
    };

    let report = download_all(
        &entries,
        &env.download_dir,
        &plan,
        &config,
        &state,
        Some(&mut on_progress),
    );
    bar.finish_and_clear();

    println!(
        "Downloaded {} files, {} already current",
        style(report.succeeded).green(),
        report.cached
    );

    if report.is_success() {
        Ok(())
    } else {
        println!("\nFailed downloads:");
        for (name, reason) in &report.failed {
            println!("  {} - {}", style(name).red(), reason);
        }
        Err(CliError::DownloadsFailed(report.failed.len()))
    }
}

/// Every manifest entry, minus loose container files unless requested.
///
/// Container archives are rebuilt locally by `build`; pulling the whole
/// multi-gigabyte .mpq over the wire is opt-in.
fn all_entries(env: &Environment, include_mpq: bool) -> Result<Vec<ManifestEntry>, CliError> {
    let manifest = env.fetch_manifest()?;
    let entries: Vec<ManifestEntry> = manifest
        .entries
        .into_iter()
        .filter(|e| {
            include_mpq
                || e.category != Category::Loose
                || !e.name.to_ascii_lowercase().ends_with(".mpq")
        })
        .collect();

    if !include_mpq {
        println!("Found {} files in manifest (excluding .mpq files)", entries.len());
    } else {
        println!("Found {} files in manifest", entries.len());
    }
    Ok(entries)
}

/// Outdated entries recorded by the last `check` run.
fn outdated_from_report(env: &Environment) -> Result<Vec<ManifestEntry>, CliError> {
    let path = env.report_path();
    let report = match load_report(&path) {
        Ok(report) => report,
        Err(ReportError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            return Err(CliError::NoReport(path));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(report.outdated_entries()?)
}
