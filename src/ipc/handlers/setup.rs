use crate::batch::MAX_BATCH_OPS;
use crate::db;
use crate::ipc::helpers::{
    db_conn, require_capability, required_str, respond, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::users::Capability;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
pub enum SetupSection {
    School,
    Import,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "import" => Some(Self::Import),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::School => "school",
            Self::Import => "import",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::School => "setup.school",
            Self::Import => "setup.import",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::School => json!({
            "name": "",
            "city": "",
            "state": "",
            "principal": "",
            "secretary": ""
        }),
        SetupSection::Import => json!({
            "batchSize": MAX_BATCH_OPS,
            "defaultStatus": "ATIVO"
        }),
    }
}

fn field_err(section: SetupSection, key: &str, message: String) -> HandlerErr {
    HandlerErr::bad_params(message).with_details(json!({ "section": section.name(), "field": key }))
}

/// Trimmed text of at most `max_chars` characters.
fn text_field(section: SetupSection, key: &str, v: &Value, max_chars: usize) -> Result<String, HandlerErr> {
    let Some(s) = v.as_str().map(str::trim) else {
        return Err(field_err(section, key, format!("{key} must be text")));
    };
    if s.chars().count() > max_chars {
        return Err(field_err(section, key, format!("{key} allows at most {max_chars} characters")));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), HandlerErr> {
    let Value::Object(obj) = current else {
        return Err(HandlerErr::new("db_query_failed", "stored setup section is not an object"));
    };
    for (k, v) in patch {
        let value = match (section, k.as_str()) {
            (SetupSection::School, "name" | "principal" | "secretary") => {
                Value::String(text_field(section, k, v, 160)?)
            }
            (SetupSection::School, "city") => Value::String(text_field(section, k, v, 120)?),
            (SetupSection::School, "state") => {
                Value::String(text_field(section, k, v, 2)?.to_uppercase())
            }
            (SetupSection::Import, "batchSize") => match v.as_u64() {
                Some(n) if (1..=MAX_BATCH_OPS as u64).contains(&n) => Value::from(n),
                _ => {
                    return Err(field_err(
                        section,
                        k,
                        format!("batchSize must be an integer in 1..={MAX_BATCH_OPS}"),
                    ))
                }
            },
            (SetupSection::Import, "defaultStatus") => Value::String(text_field(section, k, v, 40)?),
            _ => {
                return Err(field_err(
                    section,
                    k,
                    format!("unknown {} field: {k}", section.name()),
                ))
            }
        };
        obj.insert(k.clone(), value);
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // A malformed stored value falls back to its default.
            for (k, v) in saved_obj {
                let one: Map<String, Value> = std::iter::once((k.clone(), v.clone())).collect();
                let _ = merge_section_patch(section, &mut current, &one);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub default_status: Option<String>,
}

pub fn import_settings(conn: &rusqlite::Connection) -> anyhow::Result<ImportSettings> {
    let section = load_section(conn, SetupSection::Import)?;
    Ok(ImportSettings {
        batch_size: section
            .get("batchSize")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(MAX_BATCH_OPS),
        default_status: section
            .get("defaultStatus")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .filter(|s| !s.is_empty()),
    })
}

fn setup_get(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    Ok(json!({
        "school": load_section(conn, SetupSection::School)?,
        "import": load_section(conn, SetupSection::Import)?,
    }))
}

fn setup_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let actor = require_capability(conn, req, Capability::ManageWorkspace)?;
    let section_raw = required_str(req, "section")?;
    let Some(section) = SetupSection::parse(section_raw) else {
        return Err(HandlerErr::bad_params(format!("unknown section: {section_raw}")));
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::new("db_update_failed", format!("{e:#}")))?;
    log::info!("{} updated setup section {}", actor.uid, section.name());
    Ok(json!({ "ok": true, "section": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.get" => setup_get(state, req),
        "setup.update" => setup_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_patch_validates_batch_size() {
        let mut cur = default_section(SetupSection::Import);
        let bad = json!({ "batchSize": 501 });
        assert!(merge_section_patch(SetupSection::Import, &mut cur, bad.as_object().expect("obj")).is_err());
        let good = json!({ "batchSize": 100, "defaultStatus": " TRANSFERIDO " });
        merge_section_patch(SetupSection::Import, &mut cur, good.as_object().expect("obj"))
            .expect("valid patch");
        assert_eq!(cur["batchSize"], 100);
        assert_eq!(cur["defaultStatus"], "TRANSFERIDO");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut cur = default_section(SetupSection::School);
        let patch = json!({ "motto": "x" });
        let e = merge_section_patch(SetupSection::School, &mut cur, patch.as_object().expect("obj"))
            .expect_err("unknown field");
        assert_eq!(e.code, "bad_params");
        assert_eq!(e.details.expect("details"), json!({ "section": "school", "field": "motto" }));
    }

    #[test]
    fn school_state_is_two_uppercase_letters() {
        let mut cur = default_section(SetupSection::School);
        let patch = json!({ "state": " sp ", "city": "Campinas" });
        merge_section_patch(SetupSection::School, &mut cur, patch.as_object().expect("obj"))
            .expect("valid patch");
        assert_eq!(cur["state"], "SP");
        let bad = json!({ "state": "São Paulo" });
        assert!(merge_section_patch(SetupSection::School, &mut cur, bad.as_object().expect("obj")).is_err());
        assert_eq!(cur["state"], "SP");
    }
}
