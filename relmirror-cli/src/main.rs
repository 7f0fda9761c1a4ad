//! relmirror: mirror GitHub releases from one repository into another.
//!
//! # Usage
//!
//! ```text
//! relmirror sync [--source <owner/repo>] [--target <owner/repo>] [--ledger <path>]
//!                [--staging-dir <dir>] [--retry-count <n>] [--retry-delay <secs>] [--no-commit]
//! relmirror status [--ledger <path>] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "relmirror",
    version,
    about = "Mirror GitHub releases, assets and source archives into another repository",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins when set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror every source release into the target repository.
    Sync(SyncArgs),

    /// Show what the sync ledger has recorded.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
