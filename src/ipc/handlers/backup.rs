use crate::backup;
use crate::db;
use crate::ipc::helpers::{
    db_conn, optional_str, require_capability, required_str, respond, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::users::Capability;
use serde_json::json;
use std::path::{Path, PathBuf};

fn backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let out_path = required_str(req, "outPath")?;
    let conn = db_conn(state)?;
    let actor = require_capability(conn, req, Capability::ManageWorkspace)?;
    let Some(workspace_path) = state.workspace.as_deref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    // Fold the WAL into the main file so the copy is complete.
    if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
        log::warn!("wal checkpoint before export failed: {e}");
    }

    let export = backup::export_workspace_bundle(workspace_path, Path::new(out_path)).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
    })?;
    log::info!("{} exported workspace bundle to {}", actor.uid, out_path);
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "dbSha256": export.db_sha256,
        "dbBytes": export.db_bytes
    }))
}

/// A restore replaces the target's whole database, users included, so the
/// actor must be allowed to manage that workspace. A target without a
/// database or without any account has nothing to guard yet.
fn authorize_restore(state: &AppState, req: &Request, target: &Path) -> Result<(), HandlerErr> {
    if state.workspace.as_deref() == Some(target) {
        let conn = db_conn(state)?;
        if !db::users_list(conn)?.is_empty() {
            require_capability(conn, req, Capability::ManageWorkspace)?;
        }
        return Ok(());
    }
    if target.join(db::DB_FILE_NAME).is_file() {
        let conn = db::open_db(target)?;
        if !db::users_list(&conn)?.is_empty() {
            require_capability(&conn, req, Capability::ManageWorkspace)?;
        }
    }
    Ok(())
}

fn backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let in_path = required_str(req, "inPath")?;
    let Some(workspace_path) = optional_str(req, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
    else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    authorize_restore(state, req, &workspace_path)?;
    let src = PathBuf::from(in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Drop open handle before replacing file.
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            // Keep serving the previous workspace when the bundle is rejected.
            if let Some(prev) = state.workspace.clone() {
                if let Err(reopen) = super::core::open_workspace(state, prev) {
                    log::error!("failed to reopen workspace after rejected import: {reopen:#}");
                }
            }
            return Err(HandlerErr::new("import_failed", format!("{e:#}"))
                .with_details(json!({ "path": in_path })));
        }
    };

    let count = super::core::open_workspace(state, workspace_path.clone())
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "dbSha256": import.db_sha256,
        "studentCount": count
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => backup_export_workspace_bundle(state, req),
        "backup.importWorkspaceBundle" => backup_import_workspace_bundle(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
