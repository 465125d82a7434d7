use super::import::ingest_err;
use super::setup::import_settings;
use crate::batch::{self, WriteOp};
use crate::db;
use crate::ingest;
use crate::ipc::helpers::{
    db_conn, optional_str, require_capability, required_str, respond, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::users::Capability;
use serde_json::json;
use std::path::PathBuf;

/// Merge grades into existing students. Unknown RMs are reported and never
/// create records.
fn grades_import(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let actor = require_capability(conn, req, Capability::UploadGrades)?;
    let path = required_str(req, "path")?.to_string();
    let prepared = ingest::prepare_grades(&PathBuf::from(&path), optional_str(req, "sheet"))
        .map_err(|e| ingest_err(e, &path))?;
    let settings = import_settings(conn)?;
    let keys = db::student_keys(conn)?;

    let mut unknown: Vec<String> = Vec::new();
    let mut ops = Vec::new();
    for row in prepared.batch.rows {
        if keys.contains(&row.rm) {
            ops.push(WriteOp::Upsert {
                rm: row.rm,
                patch: row.patch,
            });
        } else if !unknown.contains(&row.rm) {
            unknown.push(row.rm);
        }
    }
    if !unknown.is_empty() {
        log::warn!("grades.import: {} unknown RMs in {}", unknown.len(), path);
    }
    log::info!("{} uploading grades for {} students from {}", actor.uid, ops.len(), path);

    let outcome = batch::commit_batches(
        conn,
        &ops,
        settings.batch_size,
        "grades.import",
        &state.events.emitter(),
    );
    Ok(json!({
        "path": path,
        "matched": ops.len(),
        "unknownRms": unknown,
        "skipped": prepared.batch.skipped,
        "outcome": outcome,
        "diagnostics": prepared.diagnostics,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.import" => grades_import(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
