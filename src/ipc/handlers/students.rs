use crate::batch::{self, WriteOp, MAX_BATCH_OPS};
use crate::db;
use crate::export;
use crate::ingest::headers::{normalize_header, normalize_key};
use crate::ingest::rows::{phone_cell, split_boletim_column};
use crate::ingest::Cell;
use crate::ipc::helpers::{
    check_optional_actor, db_conn, optional_str, optional_usize, require_capability,
    required_str, respond, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    format_number, grade_from_value, is_text_field, Document, Stage, FIELD_BOLETIM,
    FIELD_DATA_NASCIMENTO, FIELD_NEE, FIELD_RM, FIELD_TELEFONES,
};
use crate::query::{run_query, SortDirection, SortKey, StudentFilters, Window};
use crate::users::Capability;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

fn students_count(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    check_optional_actor(conn, req, Capability::ReadStudents)?;
    Ok(json!({ "count": db::students_count(conn)? }))
}

fn students_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    check_optional_actor(conn, req, Capability::ReadStudents)?;
    let rm = required_str(req, "rm")?;
    match db::student_get(conn, rm)? {
        Some(s) => Ok(json!({ "student": s.to_json() })),
        None => Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "rm": rm }))),
    }
}

fn parse_filters(req: &Request) -> Result<StudentFilters, HandlerErr> {
    match req.params.get("filters") {
        None | Some(Value::Null) => Ok(StudentFilters::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {e}"))),
    }
}

fn parse_sort_key(raw: &str) -> Result<SortKey, HandlerErr> {
    SortKey::parse(raw).ok_or_else(|| HandlerErr::bad_params(format!("unknown sort key: {raw}")))
}

/// `sortToggle` behaves like clicking a column header; `sortKey` (with an
/// optional `sortDirection`) sets the order outright. Either way the
/// selection persists for later queries.
fn students_query(state: &mut AppState, req: &Request) -> HandlerResult {
    let filters = parse_filters(req)?;
    let window = Window {
        offset: optional_usize(req, "offset")?.unwrap_or(0),
        limit: optional_usize(req, "limit")?,
    };

    let mut sort = state.sort;
    if let Some(raw) = optional_str(req, "sortToggle") {
        sort.select(parse_sort_key(raw)?);
    } else if let Some(raw) = optional_str(req, "sortKey") {
        sort.key = parse_sort_key(raw)?;
        sort.direction = match optional_str(req, "sortDirection") {
            Some(d) => SortDirection::parse(d)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown sort direction: {d}")))?,
            None => SortDirection::Asc,
        };
    }

    let conn = db_conn(state)?;
    check_optional_actor(conn, req, Capability::ReadStudents)?;
    let records = db::students_load_all(conn)?;
    let page = run_query(records, &filters, sort, window);
    state.sort = sort;

    let rows: Vec<Value> = page.rows.iter().map(|s| s.to_json()).collect();
    Ok(json!({
        "total": page.total,
        "offset": window.offset,
        "rows": rows,
        "sort": sort,
    }))
}

fn invalid_field(key: &str, expected: &str) -> HandlerErr {
    HandlerErr::new("invalid_field", format!("{key} must be {expected}"))
        .with_details(json!({ "field": key }))
}

fn text_or_null(key: &str, v: &Value) -> Result<Value, HandlerErr> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        Value::Number(n) => Ok(n
            .as_f64()
            .map(|f| Value::String(format_number(f)))
            .unwrap_or(Value::Null)),
        _ => Err(invalid_field(key, "text or null")),
    }
}

fn grade_value(grade: &Value) -> Result<Value, HandlerErr> {
    match grade {
        Value::Null => Ok(Value::Null),
        other => grade_from_value(other)
            .map(Value::from)
            .ok_or_else(|| invalid_field(FIELD_BOLETIM, "numeric grades")),
    }
}

fn put_grade(grades: &mut Map<String, Value>, subject: String, stage: Stage, value: Value) {
    let entry = grades
        .entry(subject)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(stages) = entry {
        stages.insert(stage.key().to_string(), value);
    }
}

/// Subjects are normalized like sheet headers so `Matemática` lands on
/// `matematica`.
fn boletim_patch(v: &Value, grades: &mut Map<String, Value>) -> Result<(), HandlerErr> {
    let Some(subjects) = v.as_object() else {
        return Err(invalid_field(FIELD_BOLETIM, "an object of subjects"));
    };
    for (subject_raw, stages) in subjects {
        let subject = normalize_key(subject_raw);
        let Some(stages) = stages.as_object() else {
            return Err(invalid_field(FIELD_BOLETIM, "subject -> stage -> grade"));
        };
        if subject.is_empty() {
            return Err(invalid_field(FIELD_BOLETIM, "keyed by non-empty subjects"));
        }
        for (stage_raw, grade) in stages {
            let stage = Stage::parse(stage_raw).ok_or_else(|| {
                HandlerErr::new("invalid_field", format!("unknown stage: {stage_raw}"))
                    .with_details(json!({ "field": FIELD_BOLETIM, "subject": subject }))
            })?;
            put_grade(grades, subject.clone(), stage, grade_value(grade)?);
        }
    }
    Ok(())
}

/// Type-check an edit against the canonical schema. Keys go through the
/// same normalization as sheet headers; ad-hoc fields pass through.
fn validate_patch(rm: &str, patch: &Map<String, Value>) -> Result<Document, HandlerErr> {
    let mut out = Document::new();
    let mut grades = Map::new();
    for (raw_key, v) in patch {
        let key = normalize_header(raw_key);
        if key.is_empty() {
            return Err(HandlerErr::bad_params("patch keys must be non-empty"));
        }
        if let Some((subject, stage)) = split_boletim_column(&key) {
            put_grade(&mut grades, subject, stage, grade_value(v)?);
            continue;
        }
        if out.contains_key(&key) {
            return Err(HandlerErr::new("invalid_field", format!("{raw_key} repeats field {key}"))
                .with_details(json!({ "field": key })));
        }
        let value = match key.as_str() {
            FIELD_RM => {
                let incoming = crate::model::value_as_text(v).unwrap_or_default();
                if incoming != rm {
                    return Err(HandlerErr::new("rm_immutable", "RM cannot be changed")
                        .with_details(json!({ "rm": rm, "attempted": v })));
                }
                continue;
            }
            FIELD_NEE => match v {
                Value::Null | Value::Bool(_) => v.clone(),
                _ => return Err(invalid_field(&key, "boolean or null")),
            },
            FIELD_TELEFONES => {
                let cell = match v {
                    Value::Null => Cell::Empty,
                    Value::String(s) => Cell::Text(s.clone()),
                    Value::Array(_) => Cell::Nested(v.clone()),
                    _ => return Err(invalid_field(&key, "a list of phone numbers")),
                };
                phone_cell(&cell).map(Value::Array).unwrap_or(Value::Null)
            }
            FIELD_DATA_NASCIMENTO => {
                let t = text_or_null(&key, v)?;
                if let Value::String(s) = &t {
                    if crate::dates::parse_br(s).is_none() {
                        return Err(invalid_field(&key, "a DD/MM/YYYY date"));
                    }
                }
                t
            }
            FIELD_BOLETIM => {
                boletim_patch(v, &mut grades)?;
                continue;
            }
            k if is_text_field(k) => text_or_null(k, v)?,
            _ => v.clone(),
        };
        out.insert(key, value);
    }
    if !grades.is_empty() {
        out.insert(FIELD_BOLETIM.to_string(), Value::Object(grades));
    }
    Ok(out)
}

fn students_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    require_capability(conn, req, Capability::EditStudents)?;
    let rm = required_str(req, "rm")?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    if db::student_get(conn, rm)?.is_none() {
        return Err(HandlerErr::new("not_found", "student not found").with_details(json!({ "rm": rm })));
    }
    let doc = validate_patch(rm, patch)?;
    db::student_upsert_merge(conn, rm, &doc)?;
    let updated = db::student_get(conn, rm)?
        .ok_or_else(|| HandlerErr::new("not_found", "student vanished during update"))?;
    Ok(json!({ "student": updated.to_json() }))
}

fn string_list(req: &Request, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = req.params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("{key} must be an array")));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match crate::model::value_as_text(item) {
            Some(s) => out.push(s),
            None => return Err(HandlerErr::bad_params(format!("{key} must hold non-empty values"))),
        }
    }
    Ok(out)
}

/// Admin bulk delete: `rms` or `all: true`. Batches of at most 500.
fn students_delete_many(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let actor = require_capability(conn, req, Capability::BulkDelete)?;
    let all = req.params.get("all").and_then(|v| v.as_bool()).unwrap_or(false);
    let mut rms: Vec<String> = if all {
        db::student_keys(conn)?.into_iter().collect()
    } else {
        string_list(req, "rms")?
    };
    rms.sort();
    rms.dedup();

    let ops: Vec<WriteOp> = rms.into_iter().map(|rm| WriteOp::Delete { rm }).collect();
    log::info!("{} deleting {} students", actor.uid, ops.len());
    let outcome = batch::commit_batches(
        conn,
        &ops,
        MAX_BATCH_OPS,
        "students.deleteMany",
        &state.events.emitter(),
    );
    Ok(json!({
        "requested": ops.len(),
        "deleted": outcome.committed_ops - outcome.missing,
        "outcome": outcome,
    }))
}

fn shift_days(req: &Request) -> Result<i64, HandlerErr> {
    let days = match req.params.get("days") {
        None | Some(Value::Null) => 1,
        Some(v) => v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params("days must be an integer"))?,
    };
    if !(-366..=366).contains(&days) || days == 0 {
        return Err(HandlerErr::bad_params("days must be a non-zero value in -366..=366"));
    }
    Ok(days)
}

/// Shift every parseable birth date by `days` (default one day forward).
fn students_correct_birth_dates(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let actor = require_capability(conn, req, Capability::CorrectData)?;
    let days = shift_days(req)?;

    let mut ops = Vec::new();
    let mut unparseable = Vec::new();
    for s in db::students_load_all(conn)? {
        let Some(raw) = s.text(FIELD_DATA_NASCIMENTO) else {
            continue;
        };
        match crate::dates::shift_br(&raw, days) {
            Some(shifted) => {
                let mut patch = Document::new();
                patch.insert(FIELD_DATA_NASCIMENTO.to_string(), Value::String(shifted));
                ops.push(WriteOp::Upsert { rm: s.rm, patch });
            }
            None => unparseable.push(s.rm),
        }
    }
    log::info!("{} shifting {} birth dates by {} day(s)", actor.uid, ops.len(), days);
    let outcome = batch::commit_batches(
        conn,
        &ops,
        MAX_BATCH_OPS,
        "students.correctBirthDates",
        &state.events.emitter(),
    );
    Ok(json!({
        "days": days,
        "corrected": outcome.committed_ops,
        "unparseable": unparseable,
        "outcome": outcome,
    }))
}

fn students_export_xlsx(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    require_capability(conn, req, Capability::Export)?;
    let out_path = PathBuf::from(required_str(req, "outPath")?);
    let mut records = db::students_load_all(conn)?;
    crate::query::sort_records(&mut records, state.sort);
    let summary = export::export_students_xlsx(&out_path, &records).map_err(|e| {
        HandlerErr::new(e.code(), e.to_string())
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "rows": summary.rows,
        "columns": summary.columns,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.count" => students_count(state, req),
        "students.get" => students_get(state, req),
        "students.query" => students_query(state, req),
        "students.update" => students_update(state, req),
        "students.deleteMany" => students_delete_many(state, req),
        "students.correctBirthDates" => students_correct_birth_dates(state, req),
        "students.exportXlsx" => students_export_xlsx(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
