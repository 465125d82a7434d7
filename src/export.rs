//! Workbook export of the whole `alunos` collection.
//!
//! Column order: canonical fields, then ad-hoc fields (sorted), then the
//! grade book flattened into `boletim_<subject>_<stage>` columns. The
//! export re-imports cleanly through the header normalizer.

use crate::model::{
    value_as_text, Stage, StudentRecord, CANONICAL_FIELDS, FIELD_BOLETIM, FIELD_TELEFONES,
};
use crate::ingest::rows::BOLETIM_PREFIX;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

pub const SHEET_NAME: &str = "alunos";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("xlsx error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::Xlsx(_) => "export_failed",
            ExportError::Io(_) => "io_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Field(String),
    Grade { subject: String, stage: Stage },
}

impl Column {
    fn header(&self) -> String {
        match self {
            Column::Field(k) => k.clone(),
            Column::Grade { subject, stage } => {
                format!("{BOLETIM_PREFIX}{subject}_{}", stage.key())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    pub columns: Vec<String>,
}

fn plan_columns(records: &[StudentRecord]) -> Vec<Column> {
    let mut cols: Vec<Column> = CANONICAL_FIELDS
        .iter()
        .filter(|k| **k != FIELD_BOLETIM)
        .map(|k| Column::Field((*k).to_string()))
        .collect();

    let adhoc: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys())
        .map(String::as_str)
        .filter(|k| !CANONICAL_FIELDS.contains(k))
        .collect();
    cols.extend(adhoc.into_iter().map(|k| Column::Field(k.to_string())));

    // Only stages some record actually carries.
    let mut grades: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
    for r in records {
        for (subject, entry) in r.boletim() {
            let seen = grades.entry(subject).or_default();
            for (i, stage) in Stage::ALL.iter().enumerate() {
                if entry.get(*stage).is_some() {
                    seen.insert(i);
                }
            }
        }
    }
    for (subject, stages) in grades {
        for i in stages {
            cols.push(Column::Grade {
                subject: subject.clone(),
                stage: Stage::ALL[i],
            });
        }
    }
    cols
}

pub fn export_students_xlsx(
    out_path: &Path,
    records: &[StudentRecord],
) -> Result<ExportSummary, ExportError> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let columns = plan_columns(records);
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (c, col) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, c as u16, col.header(), &header_format)?;
    }

    for (i, rec) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        let book = rec.boletim();
        for (c, col) in columns.iter().enumerate() {
            let c = c as u16;
            match col {
                Column::Field(key) if key == crate::model::FIELD_RM => {
                    sheet.write_string(row, c, &rec.rm)?;
                }
                Column::Field(key) if key == FIELD_TELEFONES => {
                    let phones = rec.telefones();
                    if !phones.is_empty() {
                        sheet.write_string(row, c, phones.join(", "))?;
                    }
                }
                Column::Field(key) => match rec.fields.get(key) {
                    Some(Value::Number(n)) if !crate::model::is_text_field(key) => {
                        if let Some(v) = n.as_f64() {
                            sheet.write_number(row, c, v)?;
                        }
                    }
                    Some(v) => {
                        if let Some(text) = value_as_text(v) {
                            sheet.write_string(row, c, text)?;
                        }
                    }
                    None => {}
                },
                Column::Grade { subject, stage } => {
                    if let Some(v) = book.get(subject).and_then(|e| e.get(*stage)) {
                        sheet.write_number(row, c, v)?;
                    }
                }
            }
        }
    }

    workbook.save(out_path)?;
    log::info!("exported {} students to {}", records.len(), out_path.display());
    Ok(ExportSummary {
        rows: records.len(),
        columns: columns.iter().map(Column::header).collect(),
    })
}
