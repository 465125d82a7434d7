use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Stored body of a student document. The RM is the row key and is never
/// part of the body.
pub type Document = Map<String, Value>;

pub const FIELD_RM: &str = "rm";
pub const FIELD_NOME: &str = "nome";
pub const FIELD_ENSINO: &str = "ensino";
pub const FIELD_SERIE: &str = "serie";
pub const FIELD_TURMA: &str = "turma";
pub const FIELD_TURNO: &str = "turno";
pub const FIELD_DATA_NASCIMENTO: &str = "data_nascimento";
pub const FIELD_NOME_MAE: &str = "nome_mae";
pub const FIELD_NOME_PAI: &str = "nome_pai";
pub const FIELD_RESPONSAVEL: &str = "responsavel";
pub const FIELD_ENDERECO: &str = "endereco";
pub const FIELD_TELEFONES: &str = "telefones";
pub const FIELD_NEE: &str = "nee";
pub const FIELD_NEE_DESCRICAO: &str = "nee_descricao";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_BOLETIM: &str = "boletim";

/// Canonical student fields in export/display order.
pub const CANONICAL_FIELDS: [&str; 16] = [
    FIELD_RM,
    FIELD_NOME,
    FIELD_ENSINO,
    FIELD_SERIE,
    FIELD_TURMA,
    FIELD_TURNO,
    FIELD_DATA_NASCIMENTO,
    FIELD_NOME_MAE,
    FIELD_NOME_PAI,
    FIELD_RESPONSAVEL,
    FIELD_ENDERECO,
    FIELD_TELEFONES,
    FIELD_NEE,
    FIELD_NEE_DESCRICAO,
    FIELD_STATUS,
    FIELD_BOLETIM,
];

/// Canonical fields that always hold text (numbers from spreadsheets are
/// rendered, not stored as numbers).
pub const TEXT_FIELDS: [&str; 12] = [
    FIELD_RM,
    FIELD_NOME,
    FIELD_ENSINO,
    FIELD_SERIE,
    FIELD_TURMA,
    FIELD_TURNO,
    FIELD_NOME_MAE,
    FIELD_NOME_PAI,
    FIELD_RESPONSAVEL,
    FIELD_ENDERECO,
    FIELD_NEE_DESCRICAO,
    FIELD_STATUS,
];

pub fn is_text_field(key: &str) -> bool {
    TEXT_FIELDS.contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Stage1,
    Stage2,
    Stage3,
    Stage4,
    FinalAverage,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Stage1,
        Stage::Stage2,
        Stage::Stage3,
        Stage::Stage4,
        Stage::FinalAverage,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Stage::Stage1 => "stage1",
            Stage::Stage2 => "stage2",
            Stage::Stage3 => "stage3",
            Stage::Stage4 => "stage4",
            Stage::FinalAverage => "finalAverage",
        }
    }

    /// Accepts the stored keys plus the spellings seen in grade sheets
    /// ("1", "etapa1", "1_etapa", "media", "media_final", ...).
    pub fn parse(raw: &str) -> Option<Stage> {
        let t: String = crate::text::fold(raw.trim())
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match t.as_str() {
            "1" | "stage1" | "etapa1" | "1etapa" | "e1" | "b1" | "1bimestre" | "bimestre1" => {
                Some(Stage::Stage1)
            }
            "2" | "stage2" | "etapa2" | "2etapa" | "e2" | "b2" | "2bimestre" | "bimestre2" => {
                Some(Stage::Stage2)
            }
            "3" | "stage3" | "etapa3" | "3etapa" | "e3" | "b3" | "3bimestre" | "bimestre3" => {
                Some(Stage::Stage3)
            }
            "4" | "stage4" | "etapa4" | "4etapa" | "e4" | "b4" | "4bimestre" | "bimestre4" => {
                Some(Stage::Stage4)
            }
            "finalaverage" | "final" | "media" | "mediafinal" | "mf" => Some(Stage::FinalAverage),
            _ => None,
        }
    }

    pub fn is_term(self) -> bool {
        !matches!(self, Stage::FinalAverage)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage4: Option<f64>,
    #[serde(
        rename = "finalAverage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub final_average: Option<f64>,
}

impl GradeEntry {
    pub fn get(&self, stage: Stage) -> Option<f64> {
        match stage {
            Stage::Stage1 => self.stage1,
            Stage::Stage2 => self.stage2,
            Stage::Stage3 => self.stage3,
            Stage::Stage4 => self.stage4,
            Stage::FinalAverage => self.final_average,
        }
    }

    pub fn set(&mut self, stage: Stage, value: Option<f64>) {
        match stage {
            Stage::Stage1 => self.stage1 = value,
            Stage::Stage2 => self.stage2 = value,
            Stage::Stage3 => self.stage3 = value,
            Stage::Stage4 => self.stage4 = value,
            Stage::FinalAverage => self.final_average = value,
        }
    }
}

pub type GradeBook = BTreeMap<String, GradeEntry>;

/// A student document together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    pub rm: String,
    pub fields: Document,
}

impl StudentRecord {
    pub fn new(rm: String, mut fields: Document) -> Self {
        fields.remove(FIELD_RM);
        Self { rm, fields }
    }

    /// Text view of a field; numbers are rendered, booleans become SIM/NÃO.
    pub fn text(&self, key: &str) -> Option<String> {
        if key == FIELD_RM {
            return Some(self.rm.clone());
        }
        value_as_text(self.fields.get(key)?)
    }

    pub fn nome(&self) -> String {
        self.text(FIELD_NOME).unwrap_or_default()
    }

    pub fn nee(&self) -> bool {
        match self.fields.get(FIELD_NEE) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => {
                let t = crate::text::fold(s);
                matches!(t.trim(), "sim" | "s" | "true" | "1" | "x")
            }
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            _ => false,
        }
    }

    pub fn telefones(&self) -> Vec<String> {
        match self.fields.get(FIELD_TELEFONES) {
            Some(Value::Array(items)) => items.iter().filter_map(value_as_text).collect(),
            Some(other) => value_as_text(other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn boletim(&self) -> GradeBook {
        match self.fields.get(FIELD_BOLETIM) {
            Some(v) => grade_book_from_value(v),
            None => GradeBook::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert(FIELD_RM.to_string(), Value::String(self.rm.clone()));
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }
}

pub fn value_as_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Value::Number(n) => n.as_f64().map(format_number),
        Value::Bool(b) => Some(if *b { "SIM".to_string() } else { "NÃO".to_string() }),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_as_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Object(_) => Some(v.to_string()),
    }
}

/// Integral values render without a decimal part (12345.0 -> "12345").
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Lenient grade-book reader: unknown stage keys and non-numeric grades are
/// ignored.
pub fn grade_book_from_value(v: &Value) -> GradeBook {
    let mut book = GradeBook::new();
    let Some(subjects) = v.as_object() else {
        return book;
    };
    for (subject, stages) in subjects {
        let Some(stages) = stages.as_object() else {
            continue;
        };
        let mut entry = GradeEntry::default();
        for (stage_key, grade) in stages {
            let Some(stage) = Stage::parse(stage_key) else {
                continue;
            };
            entry.set(stage, grade_from_value(grade));
        }
        book.insert(subject.clone(), entry);
    }
    book
}

pub fn grade_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_grade(s),
        _ => None,
    }
}

/// Grades come as "7.5" or "7,5".
pub fn parse_grade(raw: &str) -> Option<f64> {
    let t = raw.trim().replace(',', ".");
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Merge `patch` into `doc`: top-level fields overwrite (explicit nulls
/// included), the grade book merges per subject and stage, and the key is
/// never written into the body.
pub fn merge_document(doc: &mut Document, patch: &Document) {
    for (k, v) in patch {
        if k == FIELD_RM {
            continue;
        }
        if k == FIELD_BOLETIM {
            if let (Some(Value::Object(current)), Value::Object(incoming)) = (doc.get_mut(k), v) {
                merge_boletim(current, incoming);
                continue;
            }
        }
        doc.insert(k.clone(), v.clone());
    }
}

fn merge_boletim(current: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (subject, stages) in incoming {
        match (current.get_mut(subject), stages) {
            (Some(Value::Object(cur)), Value::Object(inc)) => {
                for (stage, grade) in inc {
                    cur.insert(stage.clone(), grade.clone());
                }
            }
            _ => {
                current.insert(subject.clone(), stages.clone());
            }
        }
    }
}
