//! gw2track - track Guild Wars 2 progress for several accounts at once.
//!
//! A thin command-line front end over `gw2track-core`: every command opens the
//! tracker from the user's config, runs one operation and prints the result.

mod commands;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gw2track_core::config::Config;
use gw2track_core::tracker::Tracker;

const USAGE: &str = "\
Usage: gw2track <command> [args]

Commands:
  users                                  List tracked accounts
  add-user <name> <api-key>              Validate a key and start tracking it
  remove-user <user-id>                  Stop tracking an account and drop its data
  rename-user <user-id> <name>           Change an account's display name
  catalog [--refresh]                    Load achievement, mastery and map catalogs
  progress <user-id> [--refresh]         Show one account's progress
  sync                                   Refresh progress for every account
  common-incomplete <user-id>...         Achievements none of the accounts has done
  waypoints [continent] [floor] [query] [--json]
                                         List or search waypoints
  mark-map <user-id> <map-id> [--undo]   Record map completion
  sweep-cache                            Delete expired cache entries
  clear-cache [prefix]                   Delete cache entries (all, or by key prefix)

Logging: RUST_LOG (default \"warn\"); a daily log file is written to the data directory.";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when the data directory is available, to a daily
/// rolling file. The returned guard flushes the file writer on drop.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match Config::data_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gw2track.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return;
    }

    if let Err(e) = run(&args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<()> {
    let config = Config::load()?;
    let mut tracker = Tracker::open(&config)?;
    info!(command = %args[0], "gw2track starting");

    let result = commands::dispatch(&mut tracker, &args[0], &args[1..]).await;
    tracker.close()?;
    result
}
