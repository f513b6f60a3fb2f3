//! Binary entry point: CLI parsing, config/logging/database bootstrap,
//! then handing off to the gateway's event loop (spec.md §6).

mod adhoc;
mod archive;
mod bridge;
mod config;
mod encoding;
mod error;
mod gateway;
mod identd;
mod iid;
mod irc;
mod logging;
mod resolver;
mod store;
mod timed_events;
mod xmpp;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use config::Config;
use gateway::Gateway;

/// A gateway between XMPP and IRC, presenting IRC channels as XMPP MUCs.
#[derive(Parser, Debug)]
#[command(name = "biboumi", version)]
struct Cli {
    /// Path to the configuration file (defaults to the XDG config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config);

    // A current-thread runtime, not multi-thread: spec.md §5 describes a
    // single-threaded cooperative event loop with no cross-task data
    // races. Every IrcClient/archive task still runs concurrently in the
    // scheduling sense, but never in parallel, preserving that guarantee.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fatal: could not start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> ExitCode {
    let db = match store::open(&config.db_name).await {
        Ok(db) => db,
        Err(e) => {
            log::error!("could not open database {}: {e}", config.db_name.display());
            return ExitCode::FAILURE;
        }
    };

    log::info!("biboumi {} starting up as {}", env!("CARGO_PKG_VERSION"), config.hostname);
    let gateway = Gateway::new(config, db);

    match gateway.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}
