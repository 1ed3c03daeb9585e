mod access;
mod blobs;
mod config;
mod credentials;
mod db;
mod error;
mod identity;
mod ipc;
mod model;
mod store;
mod tokens;
mod workflow;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // stdout carries the protocol; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = config::Config::parse();
    let services = match ipc::Services::from_config(&config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = ?e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let mut state = ipc::AppState::new(services);
    if let Some(path) = config.workspace.as_deref() {
        if let Err(e) = state.open_workspace(path) {
            error!(workspace = %path.display(), error = ?e, "workspace open failed");
            return ExitCode::FAILURE;
        }
        info!(workspace = %path.display(), "workspace opened");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    ExitCode::SUCCESS
}
