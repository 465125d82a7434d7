use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::users::{Capability, UserRecord};
use rusqlite::Connection;
use serde_json::{json, Value};

/// Error half of a handler result; rendered into the response envelope.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<anyhow::Error> for HandlerErr {
    fn from(e: anyhow::Error) -> Self {
        HandlerErr::new("db_query_failed", format!("{e:#}"))
    }
}

pub type HandlerResult = Result<Value, HandlerErr>;

pub fn respond(req: &Request, result: HandlerResult) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            log::debug!("{} failed: {} {}", req.method, e.code, e.message);
            e.response(&req.id)
        }
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim()),
        _ => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn optional_usize(req: &Request, key: &str) -> Result<Option<usize>, HandlerErr> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be a non-negative integer"))),
    }
}

/// Resolve `actorUid` and check its role. Missing or unknown actors are
/// refused.
pub fn require_capability(
    conn: &Connection,
    req: &Request,
    cap: Capability,
) -> Result<UserRecord, HandlerErr> {
    let Some(uid) = optional_str(req, "actorUid") else {
        return Err(forbidden(cap, None));
    };
    let Some(actor) = db::user_get(conn, uid)? else {
        return Err(forbidden(cap, Some(uid)));
    };
    if !actor.role.allows(cap) {
        return Err(forbidden(cap, Some(uid)));
    }
    Ok(actor)
}

/// Read paths are open to the UI shell; when it names an actor, the actor
/// must hold `cap`.
pub fn check_optional_actor(conn: &Connection, req: &Request, cap: Capability) -> Result<(), HandlerErr> {
    if optional_str(req, "actorUid").is_some() {
        require_capability(conn, req, cap)?;
    }
    Ok(())
}

fn forbidden(cap: Capability, uid: Option<&str>) -> HandlerErr {
    HandlerErr::new("forbidden", format!("not allowed: {}", cap.as_str())).with_details(json!({
        "capability": cap.as_str(),
        "actorUid": uid,
    }))
}
