//! Build command: synchronize patch archives from staged downloads.

use clap::Args;
use console::style;
use mpqsync::archive::{normalize_member, ZipArchiveStore};
use mpqsync::manifest::archive_path;
use mpqsync::sync::{synchronize_archive, SyncOptions, SyncOutcome};

use super::common::Environment;
use crate::error::CliError;

/// Arguments for the build command.
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Reconcile even when the staging directory is unchanged
    #[arg(short, long)]
    pub force: bool,
}

/// Run the build command.
///
/// A failure on one archive is reported but never stops the others.
pub fn run(env: &Environment, args: &BuildArgs) -> Result<(), CliError> {
    env.validate_game_dir()?;

    let manifest = env.fetch_manifest()?;
    let store = ZipArchiveStore;
    let state = env.state_store();
    let options = SyncOptions::default().with_force(args.force);

    let mut failed = 0;
    for (key, entries) in manifest.archived_groups() {
        let label = format!("patch-{key}");
        let expected: Vec<String> = entries
            .iter()
            .map(|e| normalize_member(&e.name))
            .collect();
        if expected.is_empty() {
            println!("{label}: no files defined in manifest, skipping");
            continue;
        }

        let archive = archive_path(&env.game_dir, &key);
        let source = env.download_dir.join(&label);

        match synchronize_archive(&store, &archive, &expected, &source, &state, &key, &options) {
            Ok(SyncOutcome::NoOp) => {
                println!("{label}: up to date (use --force to rebuild)");
            }
            Ok(SyncOutcome::FullRebuild { count }) => {
                println!(
                    "{label}: {} rebuilt with {count} members",
                    style("✓").green()
                );
            }
            Ok(SyncOutcome::Incremental {
                added,
                updated,
                removed,
                failed: skipped,
            }) => {
                println!(
                    "{label}: {} {added} added, {updated} replaced, {removed} removed",
                    style("✓").green()
                );
                if skipped > 0 {
                    println!(
                        "{label}: {} {skipped} members skipped, rerun to retry",
                        style("!").yellow()
                    );
                }
            }
            Err(e) => {
                eprintln!("{label}: {} {e}", style("✗").red());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        Err(CliError::SyncFailed(failed))
    } else {
        Ok(())
    }
}
