use super::setup::import_settings;
use crate::batch::{self, WriteOp};
use crate::db;
use crate::ingest::{self, IngestError, PreparedImport};
use crate::ipc::helpers::{
    check_optional_actor, db_conn, optional_str, require_capability, required_str, respond,
    HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::FIELD_STATUS;
use crate::users::Capability;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;

const PREVIEW_ROWS: usize = 5;

pub fn ingest_err(e: IngestError, path: &str) -> HandlerErr {
    let mut details = e.details().unwrap_or_else(|| json!({}));
    details["path"] = json!(path);
    HandlerErr::new(e.code(), e.to_string()).with_details(details)
}

fn prepare(req: &Request) -> Result<(String, PreparedImport), HandlerErr> {
    let path = required_str(req, "path")?.to_string();
    let sheet = optional_str(req, "sheet");
    let prepared =
        ingest::prepare_students(&PathBuf::from(&path), sheet).map_err(|e| ingest_err(e, &path))?;
    Ok((path, prepared))
}

/// Split mapped rows into (new, existing) counts against stored keys.
fn count_new(prepared: &PreparedImport, keys: &HashSet<String>) -> (usize, usize) {
    let mut seen = HashSet::new();
    let mut created = 0;
    let mut updated = 0;
    for row in &prepared.batch.rows {
        if !seen.insert(row.rm.as_str()) {
            continue;
        }
        if keys.contains(&row.rm) {
            updated += 1;
        } else {
            created += 1;
        }
    }
    (created, updated)
}

fn import_preview(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    check_optional_actor(conn, req, Capability::ImportStudents)?;
    let (_, prepared) = prepare(req)?;
    let keys = db::student_keys(conn)?;
    let (created, updated) = count_new(&prepared, &keys);
    let sample: Vec<Value> = prepared
        .batch
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|r| {
            let mut doc = json!({ "rm": r.rm });
            for (k, v) in &r.patch {
                doc[k] = v.clone();
            }
            doc
        })
        .collect();
    Ok(json!({
        "diagnostics": prepared.diagnostics,
        "rows": prepared.batch.rows.len(),
        "skipped": prepared.batch.skipped,
        "wouldCreate": created,
        "wouldUpdate": updated,
        "sample": sample,
    }))
}

/// Upsert every mapped row. New records without a status get the
/// configured default.
fn import_students(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let actor = require_capability(conn, req, Capability::ImportStudents)?;
    let (path, prepared) = prepare(req)?;
    let settings = import_settings(conn)?;
    let keys = db::student_keys(conn)?;
    let (created, updated) = count_new(&prepared, &keys);

    let ops: Vec<WriteOp> = prepared
        .batch
        .rows
        .into_iter()
        .map(|row| {
            let mut patch = row.patch;
            if let Some(status) = settings.default_status.as_deref() {
                let has_status = patch.get(FIELD_STATUS).map(|v| !v.is_null()).unwrap_or(false);
                if !keys.contains(&row.rm) && !has_status {
                    patch.insert(FIELD_STATUS.to_string(), Value::String(status.to_string()));
                }
            }
            WriteOp::Upsert { rm: row.rm, patch }
        })
        .collect();

    log::info!(
        "{} importing {} rows from {} ({} skipped without RM)",
        actor.uid,
        ops.len(),
        path,
        prepared.batch.skipped
    );
    let outcome = batch::commit_batches(
        conn,
        &ops,
        settings.batch_size,
        "import.students",
        &state.events.emitter(),
    );
    Ok(json!({
        "path": path,
        "created": created,
        "updated": updated,
        "skipped": prepared.batch.skipped,
        "outcome": outcome,
        "diagnostics": prepared.diagnostics,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "import.preview" => import_preview(state, req),
        "import.students" => import_students(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
