//! mpqsync command-line interface.
//!
//! Thin binary over the `mpqsync` library: argument parsing, console
//! output, and exit status live here; all reconciliation logic lives in the
//! library.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mpqsync::download::DEFAULT_MIRROR;
use mpqsync::manifest::DEFAULT_MANIFEST_URL;

use commands::{build::BuildArgs, download::DownloadArgs, update::UpdateArgs, Environment};

#[derive(Debug, Parser)]
#[command(name = "mpqsync", version, about = "Keep a game installation synchronized with its published manifest")]
struct Cli {
    /// Game installation directory
    #[arg(short, long, global = true, default_value = ".")]
    game_dir: PathBuf,

    /// Staging directory for downloaded files
    #[arg(short, long, global = true, default_value = "downloads")]
    download_dir: PathBuf,

    /// Preferred download mirror
    #[arg(short, long, global = true, default_value = DEFAULT_MIRROR)]
    mirror: String,

    /// Manifest URL
    #[arg(long, global = true, default_value = DEFAULT_MANIFEST_URL)]
    manifest_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify installed files against the manifest
    Check,
    /// Download outdated files into the staging directory
    Download(DownloadArgs),
    /// Synchronize patch archives from staged files
    Build(BuildArgs),
    /// Download updates, then synchronize the archives
    Update(UpdateArgs),
    /// Remove staged downloads, the report, and the state file
    Clean,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let env = Environment {
        game_dir: cli.game_dir,
        download_dir: cli.download_dir,
        mirror: cli.mirror,
        manifest_url: cli.manifest_url,
    };

    let result = match cli.command {
        Command::Check => commands::check::run(&env),
        Command::Download(args) => commands::download::run(&env, &args),
        Command::Build(args) => commands::build::run(&env, &args),
        Command::Update(args) => commands::update::run(&env, &args),
        Command::Clean => commands::clean::run(&env),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
