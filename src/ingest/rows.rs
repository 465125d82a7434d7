use super::Cell;
use crate::dates;
use crate::model::{
    format_number, is_text_field, parse_grade, Document, Stage, FIELD_BOLETIM,
    FIELD_DATA_NASCIMENTO, FIELD_RM, FIELD_TELEFONES,
};
use crate::text::fold;
use serde_json::{Map, Value};

pub const BOLETIM_PREFIX: &str = "boletim_";

const MIN_PHONE_DIGITS: usize = 10;

/// One spreadsheet row turned into a partial student document.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    pub rm: String,
    pub patch: Document,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedBatch {
    pub rows: Vec<MappedRow>,
    /// Rows dropped because they carry no registration number.
    pub skipped: usize,
}

pub fn map_rows(headers: &[String], rows: &[Vec<Cell>]) -> MappedBatch {
    let mut out = MappedBatch::default();
    for row in rows {
        match map_row(headers, row) {
            Some(m) => out.rows.push(m),
            None => out.skipped += 1,
        }
    }
    out
}

/// Returns `None` for rows without a registration number.
pub fn map_row(headers: &[String], cells: &[Cell]) -> Option<MappedRow> {
    let mut patch = Document::new();
    let mut boletim = Map::new();
    let mut phones: Option<Vec<Value>> = None;

    for (i, key) in headers.iter().enumerate() {
        if key.is_empty() {
            continue;
        }
        let cell = cells.get(i).unwrap_or(&Cell::Empty);

        if key == FIELD_TELEFONES {
            if let Some(found) = phone_cell(cell) {
                phones.get_or_insert_with(Vec::new).extend(found);
            }
            continue;
        }
        if key == FIELD_BOLETIM {
            if let Cell::Nested(Value::Object(subjects)) = cell {
                fold_nested_boletim(&mut boletim, subjects);
            }
            continue;
        }
        if let Some((subject, stage)) = split_boletim_column(key) {
            if let Some(grade) = grade_cell(cell) {
                let entry = boletim
                    .entry(subject)
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(stages) = entry {
                    stages.insert(stage.key().to_string(), Value::from(grade));
                }
            }
            continue;
        }

        let value = if key == FIELD_DATA_NASCIMENTO {
            birth_date_cell(cell)
        } else {
            generic_cell(key, cell)
        };
        // Duplicate columns for the same key: a later blank never hides an
        // earlier value.
        if value.is_null() && patch.get(key).map(|v| !v.is_null()).unwrap_or(false) {
            continue;
        }
        patch.insert(key.clone(), value);
    }

    if let Some(list) = phones {
        patch.insert(FIELD_TELEFONES.to_string(), Value::Array(list));
    } else if headers.iter().any(|h| h == FIELD_TELEFONES) {
        patch.insert(FIELD_TELEFONES.to_string(), Value::Null);
    }
    if !boletim.is_empty() {
        patch.insert(FIELD_BOLETIM.to_string(), Value::Object(boletim));
    }

    let rm = match patch.remove(FIELD_RM) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return None,
    };
    Some(MappedRow { rm, patch })
}

/// `boletim_<subject>_<stage>`; the stage is the last two segments for
/// spellings like `1_etapa` or `media_final`, otherwise the last one.
pub fn split_boletim_column(key: &str) -> Option<(String, Stage)> {
    let rest = key.strip_prefix(BOLETIM_PREFIX)?;
    let parts: Vec<&str> = rest.split('_').collect();
    if parts.len() < 2 {
        return None;
    }
    for take in [2usize, 1] {
        if parts.len() <= take {
            continue;
        }
        let stage_raw = parts[parts.len() - take..].join("_");
        if let Some(stage) = Stage::parse(&stage_raw) {
            let subject = parts[..parts.len() - take].join("_");
            if !subject.is_empty() {
                return Some((subject, stage));
            }
        }
    }
    None
}

fn fold_nested_boletim(boletim: &mut Map<String, Value>, subjects: &Map<String, Value>) {
    for (subject, stages) in subjects {
        let Some(stages) = stages.as_object() else {
            continue;
        };
        let entry = boletim
            .entry(subject.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(target) = entry else {
            continue;
        };
        for (stage_raw, grade) in stages {
            let Some(stage) = Stage::parse(stage_raw) else {
                continue;
            };
            if let Some(g) = crate::model::grade_from_value(grade) {
                target.insert(stage.key().to_string(), Value::from(g));
            }
        }
    }
}

fn generic_cell(key: &str, cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Number(n) => {
            if is_text_field(key) {
                Value::String(format_number(*n))
            } else {
                serde_json::Number::from_f64(*n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Cell::Text(s) => text_value(s),
        Cell::Nested(v) => v.clone(),
    }
}

/// Blank text is unknown; SIM/NÃO become booleans.
fn text_value(raw: &str) -> Value {
    let t = raw.trim();
    if t.is_empty() {
        return Value::Null;
    }
    match fold(t).as_str() {
        "sim" => Value::Bool(true),
        "nao" => Value::Bool(false),
        _ => Value::String(t.to_string()),
    }
}

/// Serials below this are years or stray numbers, not birth dates
/// (10000 is 18/05/1927).
const MIN_BIRTH_SERIAL: f64 = 10_000.0;

fn birth_serial(n: f64) -> Option<String> {
    if n < MIN_BIRTH_SERIAL {
        return None;
    }
    dates::serial_to_br(n)
}

fn birth_date_cell(cell: &Cell) -> Value {
    match cell {
        Cell::Number(n) => match birth_serial(*n) {
            Some(s) => Value::String(s),
            None => Value::String(format_number(*n)),
        },
        Cell::Text(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Value::Null;
            }
            match t.parse::<f64>().ok().and_then(birth_serial) {
                Some(d) => Value::String(d),
                None => Value::String(t.to_string()),
            }
        }
        Cell::Empty => Value::Null,
        Cell::Bool(_) => Value::Null,
        Cell::Nested(v) => v.clone(),
    }
}

/// Split on `,` `;` `/`, keep digits only, drop pieces under ten digits.
/// `None` means the cell was blank.
pub fn phone_cell(cell: &Cell) -> Option<Vec<Value>> {
    let raw = match cell {
        Cell::Empty | Cell::Bool(_) => return None,
        Cell::Number(n) => format_number(*n),
        Cell::Text(s) => s.clone(),
        Cell::Nested(Value::Array(items)) => items
            .iter()
            .filter_map(crate::model::value_as_text)
            .collect::<Vec<_>>()
            .join(","),
        Cell::Nested(v) => crate::model::value_as_text(v)?,
    };
    if raw.trim().is_empty() {
        return None;
    }
    Some(
        raw.split([',', ';', '/'])
            .map(|piece| piece.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
            .filter(|digits| digits.len() >= MIN_PHONE_DIGITS)
            .map(Value::String)
            .collect(),
    )
}

fn grade_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => parse_grade(s),
        Cell::Nested(v) => crate::model::grade_from_value(v),
        _ => None,
    }
}
