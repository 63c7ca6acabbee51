//! Check command: verify installed files against the manifest.

use std::collections::BTreeMap;

use console::style;
use mpqsync::archive::ZipArchiveStore;
use mpqsync::verify::{save_report, summarize, verify_manifest, EntryOutcome, EntryStatus};

use super::common::{format_size, Environment};
use crate::error::CliError;

/// Run the check command.
///
/// Saves the verification report for a later `download`, and exits non-zero
/// when any entry is outdated.
pub fn run(env: &Environment) -> Result<(), CliError> {
    env.validate_game_dir()?;
    println!("Game directory: {}", env.game_dir.display());

    let manifest = env.fetch_manifest()?;
    println!("Checking {} entries...", manifest.entries.len());

    let store = ZipArchiveStore;
    let statuses = verify_manifest(&manifest, &env.game_dir, &store);
    let summary = summarize(&statuses);

    println!();
    for (label, counts) in &summary.by_category {
        println!(
            "{}: {} ok, {} missing, {} size mismatch, {} hash mismatch, {} error",
            label,
            style(counts.ok).green(),
            counts.missing,
            counts.size_mismatch,
            counts.hash_mismatch,
            counts.error
        );
    }

    let outdated = summary.total_outdated();
    if outdated > 0 {
        print_outdated(&statuses);
    }

    let report_path = env.report_path();
    save_report(&report_path, &statuses)?;
    println!("\nResults saved to {}", report_path.display());

    if outdated > 0 {
        Err(CliError::Outdated(outdated))
    } else {
        println!("{}", style("All files are up to date.").green());
        Ok(())
    }
}

fn print_outdated(statuses: &[EntryStatus]) {
    let mut by_category: BTreeMap<String, Vec<&EntryStatus>> = BTreeMap::new();
    for status in statuses.iter().filter(|s| s.is_outdated()) {
        by_category
            .entry(status.entry.category.label())
            .or_default()
            .push(status);
    }

    println!("\nOutdated files:");
    for (label, mut group) in by_category {
        let total_size: u64 = group.iter().map(|s| s.entry.size).sum();
        println!(
            "\n  {}: {} files ({})",
            label,
            group.len(),
            format_size(total_size)
        );

        // Mismatches first, missing entries last.
        group.sort_by_key(|s| (outcome_rank(s.outcome), s.entry.name.clone()));
        for status in group {
            println!(
                "    - {} ({})",
                status.entry.name,
                outcome_name(status.outcome)
            );
        }
    }
}

fn outcome_rank(outcome: EntryOutcome) -> u8 {
    match outcome {
        EntryOutcome::HashMismatch => 0,
        EntryOutcome::SizeMismatch => 1,
        EntryOutcome::Missing => 2,
        EntryOutcome::Ok | EntryOutcome::Error => 3,
    }
}

fn outcome_name(outcome: EntryOutcome) -> &'static str {
    match outcome {
        EntryOutcome::Ok => "ok",
        EntryOutcome::Missing => "missing",
        EntryOutcome::SizeMismatch => "size mismatch",
        EntryOutcome::HashMismatch => "hash mismatch",
        EntryOutcome::Error => "error",
    }
}
