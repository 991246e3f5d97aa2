mod backup;
mod calc;
mod cascade;
mod config;
mod db;
mod error;
mod ipc;
mod logging;
mod mirror;
mod model;
mod roster;
mod seed;
mod store;

use clap::Parser;
use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    let cli = config::Cli::parse();
    logging::init_logging(&logging::LogConfig::from_verbosity(cli.verbose, cli.log_format))?;

    let mut state = ipc::AppState::new(config::StoreConfig::from_env());
    if let Some(path) = cli.workspace {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            tracing::error!(error = ?e, "startup workspace could not be opened");
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "studiod ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin closed with error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // Can't reply with an id we could not read.
            Err(e) => ipc::err("", "bad_json", e.to_string(), None),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    if let Some(store) = state.store.as_ref() {
        store.flush_mirror();
    }
    tracing::info!("stdin closed; exiting");
    Ok(())
}
