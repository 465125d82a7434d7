use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Write failures reported since the last drain, oldest first.
fn handle_events_drain(state: &mut AppState, req: &Request) -> serde_json::Value {
    let failures = state.events.drain();
    ok(&req.id, json!({ "failures": failures }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "events.drain" => Some(handle_events_drain(state, req)),
        _ => None,
    }
}
