//! srcmap - map program counters to source lines by driving GDB
//!
//! One-shot queries start a debugger, resolve, and exit. `serve` keeps a
//! bridge running for editor plugins.

use clap::Parser;
use commands::Commands;
use srcmap::{cli, commands, common::logging};

#[derive(Parser)]
#[command(name = "srcmap", about = "Resolve addresses to source lines and back with GDB")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The bridge runs unattended, so it also logs to a file
    let _log_guard = match &cli.command {
        Commands::Serve { .. } => {
            let (guard, log_path) = logging::init_bridge();
            if let Some(path) = log_path {
                tracing::info!(path = %path.display(), "Bridge logging to file");
            }
            guard
        }
        _ => {
            logging::init_cli();
            None
        }
    };

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
