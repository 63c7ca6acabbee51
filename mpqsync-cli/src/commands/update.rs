//! Update command: download then build, in one run.

use clap::Args;
use console::style;
use mpqsync::download::DEFAULT_WORKERS;

use super::build::{self, BuildArgs};
use super::common::Environment;
use super::download::{self, DownloadArgs};
use crate::error::CliError;

/// Arguments for the update command.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Number of parallel download workers
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Skip digest verification of downloaded files
    #[arg(long)]
    pub no_verify: bool,

    /// Rebuild archives even when the staging directory is unchanged
    #[arg(short, long)]
    pub force: bool,
}

/// Run the update command.
///
/// The build step runs even when downloads failed, so whatever did arrive
/// still lands in the archives; the first error wins the exit status.
pub fn run(env: &Environment, args: &UpdateArgs) -> Result<(), CliError> {
    println!("{}", style("Step 1/2: downloading updates").bold());
    let downloaded = download::run(
        env,
        &DownloadArgs {
            workers: args.workers,
            no_verify: args.no_verify,
            all: false,
            include_mpq: false,
        },
    );

    println!("\n{}", style("Step 2/2: building archives").bold());
    let built = build::run(env, &BuildArgs { force: args.force });

    downloaded.and(built)
}
