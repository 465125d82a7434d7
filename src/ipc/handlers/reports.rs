use super::setup::{load_section, SetupSection};
use crate::db;
use crate::ipc::helpers::{
    check_optional_actor, db_conn, optional_str, required_str, respond, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentRecord;
use crate::query::StudentFilters;
use crate::reports;
use crate::users::Capability;
use rusqlite::Connection;
use serde_json::{json, Value};

fn load_student(conn: &Connection, req: &Request) -> Result<StudentRecord, HandlerErr> {
    let rm = required_str(req, "rm")?;
    db::student_get(conn, rm)?.ok_or_else(|| {
        HandlerErr::new("not_found", "student not found").with_details(json!({ "rm": rm }))
    })
}

fn school(conn: &Connection) -> Result<Value, HandlerErr> {
    Ok(load_section(conn, SetupSection::School)?)
}

fn reports_declaration(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    check_optional_actor(conn, req, Capability::Reports)?;
    let student = load_student(conn, req)?;
    let issued_on = optional_str(req, "issuedOn")
        .map(str::to_string)
        .unwrap_or_else(crate::dates::today_br);
    if crate::dates::parse_br(&issued_on).is_none() {
        return Err(HandlerErr::bad_params("issuedOn must be DD/MM/YYYY"));
    }
    Ok(reports::declaration_model(
        &school(conn)?,
        &student,
        &issued_on,
        optional_str(req, "purpose"),
    ))
}

fn reports_report_card(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    check_optional_actor(conn, req, Capability::Reports)?;
    let student = load_student(conn, req)?;
    Ok(reports::report_card_model(
        &school(conn)?,
        &student,
        optional_str(req, "year"),
    ))
}

fn reports_class_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    check_optional_actor(conn, req, Capability::Reports)?;
    let filters = StudentFilters {
        serie: optional_str(req, "serie").map(str::to_string),
        turma: optional_str(req, "turma").map(str::to_string),
        turno: optional_str(req, "turno").map(str::to_string),
        ..Default::default()
    };
    let records = db::students_load_all(conn)?;
    Ok(reports::class_list_model(&school(conn)?, records, &filters))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.declaration" => reports_declaration(state, req),
        "reports.reportCard" => reports_report_card(state, req),
        "reports.classList" => reports_class_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
