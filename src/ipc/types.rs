use std::path::PathBuf;

use crate::events::EventBus;
use crate::query::SortState;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub events: EventBus,
    /// Sort selection of the student list, toggled by `students.query`.
    pub sort: SortState,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            events: EventBus::new(),
            sort: SortState::default(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
