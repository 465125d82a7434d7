//! Spreadsheet ingestion: read a tabular file, normalize its headers to the
//! canonical student keys and map each row to a partial student document.
//!
//! Nothing here touches the database; the caller turns the mapped rows
//! into batched writes.

pub mod headers;
pub mod rows;
pub mod sources;

use crate::model::{Document, Stage, FIELD_BOLETIM};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

pub use rows::{MappedBatch, MappedRow};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Arrays and objects from JSON sources.
    Nested(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub sheet: Option<String>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file type: {path}")]
    UnsupportedFile { path: String },

    #[error("failed to read file: {0}")]
    Read(String),

    #[error("workbook has no worksheet")]
    NoWorksheet,

    #[error("file has no header row")]
    NoHeaderRow,

    #[error("required column RM not found")]
    MissingRmColumn { detected_columns: Vec<String> },

    #[error("grade sheet has no grade columns")]
    NoGradeColumns { detected_columns: Vec<String> },
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::UnsupportedFile { .. } => "unsupported_file",
            IngestError::Read(_) => "file_read_failed",
            IngestError::NoWorksheet | IngestError::NoHeaderRow => "empty_file",
            IngestError::MissingRmColumn { .. } => "missing_required_column",
            IngestError::NoGradeColumns { .. } => "missing_required_column",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            IngestError::MissingRmColumn { detected_columns } => Some(serde_json::json!({
                "requiredColumn": "rm",
                "detectedColumns": detected_columns,
            })),
            IngestError::NoGradeColumns { detected_columns } => Some(serde_json::json!({
                "detectedColumns": detected_columns,
            })),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportDiagnostics {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub detected_columns: Vec<String>,
    pub normalized_columns: Vec<String>,
    /// Normalized columns that are not canonical student fields.
    pub adhoc_columns: Vec<String>,
    pub rows_scanned: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImport {
    pub batch: MappedBatch,
    pub diagnostics: ImportDiagnostics,
}

/// Read and map a student sheet. A sheet without an RM column is rejected
/// as a whole.
pub fn prepare_students(path: &Path, sheet_name: Option<&str>) -> Result<PreparedImport, IngestError> {
    let table = sources::read_table(path, sheet_name)?;
    let kind = sources::SourceKind::detect(path).map(|k| k.as_str()).unwrap_or("unknown");
    prepare_table(table, kind)
}

pub fn prepare_table(table: RawTable, source: &str) -> Result<PreparedImport, IngestError> {
    let normalized = headers::normalize_headers(&table.headers);
    if headers::rm_column(&normalized).is_none() {
        return Err(IngestError::MissingRmColumn {
            detected_columns: table.headers,
        });
    }

    let batch = rows::map_rows(&normalized, &table.rows);
    let diagnostics = ImportDiagnostics {
        source: source.to_string(),
        sheet: table.sheet,
        adhoc_columns: adhoc_columns(&normalized),
        detected_columns: table.headers,
        normalized_columns: normalized,
        rows_scanned: table.rows.len(),
    };
    Ok(PreparedImport { batch, diagnostics })
}

fn adhoc_columns(normalized: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for h in normalized {
        if h.is_empty()
            || crate::model::CANONICAL_FIELDS.contains(&h.as_str())
            || rows::split_boletim_column(h).is_some()
        {
            continue;
        }
        if !out.contains(h) {
            out.push(h.clone());
        }
    }
    out
}

/// Grade upload: either wide (`boletim_<subject>_<stage>` columns) or long
/// (`rm, disciplina, etapa, nota`) form. Each mapped row carries only a
/// `boletim` patch.
pub fn prepare_grades(path: &Path, sheet_name: Option<&str>) -> Result<PreparedImport, IngestError> {
    let table = sources::read_table(path, sheet_name)?;
    let kind = sources::SourceKind::detect(path).map(|k| k.as_str()).unwrap_or("unknown");
    prepare_grade_table(table, kind)
}

const LONG_SUBJECT: &str = "disciplina";
const LONG_STAGE: &str = "etapa";
const LONG_GRADE: &str = "nota";

pub fn prepare_grade_table(table: RawTable, source: &str) -> Result<PreparedImport, IngestError> {
    let normalized = headers::normalize_headers(&table.headers);
    let Some(rm_idx) = headers::rm_column(&normalized) else {
        return Err(IngestError::MissingRmColumn {
            detected_columns: table.headers,
        });
    };

    let wide = normalized
        .iter()
        .any(|h| rows::split_boletim_column(h).is_some());
    let long_cols = (
        normalized.iter().position(|h| h == LONG_SUBJECT),
        normalized.iter().position(|h| h == LONG_STAGE),
        normalized.iter().position(|h| h == LONG_GRADE),
    );

    let batch = if wide {
        // Keep only the key and the grade columns so a grade sheet never
        // clears profile fields.
        let masked: Vec<String> = normalized
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == rm_idx || rows::split_boletim_column(h).is_some() {
                    h.clone()
                } else {
                    String::new()
                }
            })
            .collect();
        let mut b = rows::map_rows(&masked, &table.rows);
        b.rows.retain(|r| r.patch.contains_key(FIELD_BOLETIM));
        b
    } else if let (Some(si), Some(ei), Some(ni)) = long_cols {
        map_long_grades(&normalized, rm_idx, si, ei, ni, &table.rows)
    } else {
        return Err(IngestError::NoGradeColumns {
            detected_columns: table.headers,
        });
    };

    let diagnostics = ImportDiagnostics {
        source: source.to_string(),
        sheet: table.sheet,
        adhoc_columns: Vec::new(),
        detected_columns: table.headers,
        normalized_columns: normalized,
        rows_scanned: table.rows.len(),
    };
    Ok(PreparedImport { batch, diagnostics })
}

fn map_long_grades(
    normalized: &[String],
    rm_idx: usize,
    subject_idx: usize,
    stage_idx: usize,
    grade_idx: usize,
    table_rows: &[Vec<Cell>],
) -> MappedBatch {
    let mut out = MappedBatch::default();
    // Several rows per student collapse into one patch, in first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut by_rm: std::collections::HashMap<String, Map<String, Value>> =
        std::collections::HashMap::new();

    for row in table_rows {
        let key_only: Vec<String> = normalized
            .iter()
            .enumerate()
            .map(|(i, h)| if i == rm_idx { h.clone() } else { String::new() })
            .collect();
        let Some(keyed) = rows::map_row(&key_only, row) else {
            out.skipped += 1;
            continue;
        };
        let subject = row
            .get(subject_idx)
            .and_then(cell_text)
            .map(|s| headers::normalize_header(&s))
            .filter(|s| !s.is_empty());
        let stage = row.get(stage_idx).and_then(cell_text).and_then(|s| Stage::parse(&s));
        let grade = row.get(grade_idx).and_then(cell_grade);
        let (Some(subject), Some(stage), Some(grade)) = (subject, stage, grade) else {
            out.skipped += 1;
            continue;
        };

        let book = by_rm.entry(keyed.rm.clone()).or_insert_with(|| {
            order.push(keyed.rm.clone());
            Map::new()
        });
        let entry = book
            .entry(subject)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(stages) = entry {
            stages.insert(stage.key().to_string(), Value::from(grade));
        }
    }

    for rm in order {
        if let Some(book) = by_rm.remove(&rm) {
            let mut patch = Document::new();
            patch.insert(FIELD_BOLETIM.to_string(), Value::Object(book));
            out.rows.push(MappedRow { rm, patch });
        }
    }
    out
}

fn cell_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Cell::Number(n) => Some(crate::model::format_number(*n)),
        _ => None,
    }
}

fn cell_grade(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => crate::model::parse_grade(s),
        _ => None,
    }
}
