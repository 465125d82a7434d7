use super::{Cell, IngestError, RawTable};
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Workbook,
    Csv,
    Json,
}

impl SourceKind {
    pub fn detect(path: &Path) -> Option<SourceKind> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())?;
        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "ods" => Some(SourceKind::Workbook),
            "csv" | "txt" => Some(SourceKind::Csv),
            "json" => Some(SourceKind::Json),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Workbook => "workbook",
            SourceKind::Csv => "csv",
            SourceKind::Json => "json",
        }
    }
}

pub fn read_table(path: &Path, sheet_name: Option<&str>) -> Result<RawTable, IngestError> {
    let kind = SourceKind::detect(path).ok_or_else(|| IngestError::UnsupportedFile {
        path: path.to_string_lossy().to_string(),
    })?;
    match kind {
        SourceKind::Workbook => read_workbook(path, sheet_name),
        SourceKind::Csv => {
            let bytes = std::fs::read(path).map_err(|e| IngestError::Read(e.to_string()))?;
            read_csv_bytes(&bytes)
        }
        SourceKind::Json => {
            let bytes = std::fs::read(path).map_err(|e| IngestError::Read(e.to_string()))?;
            read_json_bytes(&bytes)
        }
    }
}

/// Requested sheet when present, otherwise the first one.
fn read_workbook(path: &Path, sheet_name: Option<&str>) -> Result<RawTable, IngestError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| IngestError::Read(e.to_string()))?;
    let sheets = workbook.sheet_names().to_owned();
    let Some(first) = sheets.first().cloned() else {
        return Err(IngestError::NoWorksheet);
    };
    let used = match sheet_name {
        Some(name) if sheets.iter().any(|s| s == name) => name.to_string(),
        Some(name) => {
            log::warn!("sheet '{}' not found, reading '{}'", name, first);
            first
        }
        None => first,
    };

    let range = workbook
        .worksheet_range(&used)
        .map_err(|e| IngestError::Read(e.to_string()))?;
    let mut rows = range.rows();
    let header_row = rows.next().ok_or(IngestError::NoHeaderRow)?;
    let headers: Vec<String> = header_row.iter().map(header_text).collect();
    let body: Vec<Vec<Cell>> = rows
        .map(|r| r.iter().map(workbook_cell).collect::<Vec<_>>())
        .filter(|r| !row_is_blank(r))
        .collect();

    Ok(RawTable {
        headers,
        rows: body,
        sheet: Some(used),
    })
}

fn header_text(cell: &Data) -> String {
    match workbook_cell(cell) {
        Cell::Text(s) => s,
        Cell::Number(n) => crate::model::format_number(n),
        Cell::Bool(b) => b.to_string(),
        Cell::Empty | Cell::Nested(_) => String::new(),
    }
}

fn workbook_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(v) => Cell::Number(*v),
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Bool(v) => Cell::Bool(*v),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// Sheets exported from spreadsheet apps in pt-BR use `;`; anything else
/// is read as `,`.
fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().next().unwrap_or("");
    if first.matches(';').count() > first.matches(',').count() {
        b';'
    } else {
        b','
    }
}

pub fn read_csv_bytes(bytes: &[u8]) -> Result<RawTable, IngestError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());

    let mut records = rdr.records();
    let header = match records.next() {
        Some(r) => r.map_err(|e| IngestError::Read(e.to_string()))?,
        None => return Err(IngestError::NoHeaderRow),
    };
    let headers: Vec<String> = header.iter().map(|s| s.to_string()).collect();

    let mut rows = Vec::new();
    for rec in records {
        let rec = rec.map_err(|e| IngestError::Read(e.to_string()))?;
        let row: Vec<Cell> = rec
            .iter()
            .map(|s| {
                if s.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.to_string())
                }
            })
            .collect();
        if !row_is_blank(&row) {
            rows.push(row);
        }
    }

    Ok(RawTable {
        headers,
        rows,
        sheet: None,
    })
}

/// A JSON array of flat objects; column order follows first appearance
/// (`serde_json` is built with `preserve_order`).
pub fn read_json_bytes(bytes: &[u8]) -> Result<RawTable, IngestError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| IngestError::Read(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("alunos").or_else(|| map.remove("students")) {
            Some(Value::Array(items)) => items,
            _ => return Err(IngestError::Read("expected a JSON array of records".into())),
        },
        _ => return Err(IngestError::Read("expected a JSON array of records".into())),
    };

    let mut headers: Vec<String> = Vec::new();
    for item in &items {
        if let Some(obj) = item.as_object() {
            for k in obj.keys() {
                if !headers.iter().any(|h| h == k) {
                    headers.push(k.clone());
                }
            }
        }
    }
    if headers.is_empty() {
        return Err(IngestError::NoHeaderRow);
    }

    let rows = items
        .iter()
        .filter_map(|item| item.as_object())
        .map(|obj| {
            headers
                .iter()
                .map(|h| obj.get(h).map(json_cell).unwrap_or(Cell::Empty))
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(RawTable {
        headers,
        rows,
        sheet: None,
    })
}

fn json_cell(v: &Value) -> Cell {
    match v {
        Value::Null => Cell::Empty,
        Value::Bool(b) => Cell::Bool(*b),
        Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
        Value::String(s) => Cell::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => Cell::Nested(v.clone()),
    }
}

fn row_is_blank(row: &[Cell]) -> bool {
    row.iter().all(|c| match c {
        Cell::Empty => true,
        Cell::Text(s) => s.trim().is_empty(),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_with_semicolons_and_bom() {
        let bytes = "\u{feff}RM;Nome;Telefone\n101;Ana;11999990000\n;;\n102;Bruno;\n".as_bytes();
        let t = read_csv_bytes(bytes).expect("csv");
        assert_eq!(t.headers, vec!["RM", "Nome", "Telefone"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1][2], Cell::Empty);
    }

    #[test]
    fn csv_with_commas_and_quotes() {
        let bytes = b"rm,nome,endereco\n7,\"Silva, Ana\",\"Rua A, 10\"\n";
        let t = read_csv_bytes(bytes).expect("csv");
        assert_eq!(t.rows[0][1], Cell::Text("Silva, Ana".into()));
    }

    #[test]
    fn json_array_collects_headers_in_order() {
        let bytes = br#"[{"rm": 1, "nome": "Ana"}, {"rm": "2", "turma": "B", "telefones": ["11999990000"]}]"#;
        let t = read_json_bytes(bytes).expect("json");
        assert_eq!(t.headers, vec!["rm", "nome", "turma", "telefones"]);
        assert_eq!(t.rows[0][0], Cell::Number(1.0));
        assert_eq!(t.rows[0][2], Cell::Empty);
        assert!(matches!(t.rows[1][3], Cell::Nested(_)));
    }

    #[test]
    fn json_scalar_is_rejected() {
        assert!(matches!(read_json_bytes(b"42"), Err(IngestError::Read(_))));
    }

    #[test]
    fn detect_by_extension() {
        assert_eq!(SourceKind::detect(Path::new("a.XLSX")), Some(SourceKind::Workbook));
        assert_eq!(SourceKind::detect(Path::new("a.csv")), Some(SourceKind::Csv));
        assert_eq!(SourceKind::detect(Path::new("a.json")), Some(SourceKind::Json));
        assert_eq!(SourceKind::detect(Path::new("a.pdf")), None);
        assert_eq!(SourceKind::detect(Path::new("noext")), None);
    }
}
