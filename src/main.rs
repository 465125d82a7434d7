mod backup;
mod batch;
mod dates;
mod db;
mod events;
mod export;
mod ingest;
mod ipc;
mod model;
mod query;
mod reports;
mod text;
mod users;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

fn init_logging() {
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("ALUNOSD_LOG", "info"))
        .target(env_logger::Target::Stderr)
        .init();
}

fn workspace_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--workspace" {
            return args.next().map(PathBuf::from);
        }
        if let Some(v) = a.strip_prefix("--workspace=") {
            return Some(PathBuf::from(v));
        }
    }
    None
}

fn main() {
    init_logging();
    let mut state = ipc::AppState::new();

    if let Some(path) = workspace_arg() {
        let req = ipc::Request {
            id: "startup".to_string(),
            method: "workspace.select".to_string(),
            params: serde_json::json!({ "path": path.to_string_lossy() }),
        };
        let resp = ipc::handle_request(&mut state, req);
        if resp.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            log::error!("could not open workspace {}: {}", path.display(), resp["error"]);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin closed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                log::warn!("malformed request line: {e}");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        log::debug!("{} {}", req.id, req.method);
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
