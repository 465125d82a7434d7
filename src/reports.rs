//! Render-ready report models. The UI shell lays these out as PDF.

use crate::model::{
    GradeBook, Stage, StudentRecord, FIELD_DATA_NASCIMENTO, FIELD_ENSINO, FIELD_NOME_MAE,
    FIELD_NOME_PAI, FIELD_RESPONSAVEL, FIELD_SERIE, FIELD_STATUS, FIELD_TURMA, FIELD_TURNO,
};
use crate::query::{run_query, SortState, StudentFilters, Window};
use serde_json::{json, Value};

pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn student_header(s: &StudentRecord) -> Value {
    json!({
        "rm": s.rm,
        "nome": s.nome(),
        "ensino": s.text(FIELD_ENSINO),
        "serie": s.text(FIELD_SERIE),
        "turma": s.text(FIELD_TURMA),
        "turno": s.text(FIELD_TURNO),
        "dataNascimento": s.text(FIELD_DATA_NASCIMENTO),
        "nomeMae": s.text(FIELD_NOME_MAE),
        "nomePai": s.text(FIELD_NOME_PAI),
        "responsavel": s.text(FIELD_RESPONSAVEL),
        "status": s.text(FIELD_STATUS),
    })
}

/// Enrollment declaration for one student.
pub fn declaration_model(school: &Value, s: &StudentRecord, issued_on: &str, purpose: Option<&str>) -> Value {
    json!({
        "kind": "declaration",
        "school": school,
        "student": student_header(s),
        "purpose": purpose,
        "issuedOn": issued_on,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRow {
    pub subject: String,
    pub stages: [Option<f64>; 4],
    pub final_average: Option<f64>,
    /// True when the final average was derived from the stage grades.
    pub computed: bool,
}

/// A stored final average wins; otherwise the mean of the stages present,
/// rounded to one decimal.
pub fn subject_rows(book: &GradeBook) -> Vec<SubjectRow> {
    book.iter()
        .map(|(subject, entry)| {
            let stages = [
                entry.get(Stage::Stage1),
                entry.get(Stage::Stage2),
                entry.get(Stage::Stage3),
                entry.get(Stage::Stage4),
            ];
            let (final_average, computed) = match entry.final_average {
                Some(v) => (Some(v), false),
                None => {
                    let present: Vec<f64> = Stage::ALL
                        .iter()
                        .filter(|st| st.is_term())
                        .filter_map(|st| entry.get(*st))
                        .collect();
                    if present.is_empty() {
                        (None, false)
                    } else {
                        let mean = present.iter().sum::<f64>() / present.len() as f64;
                        (Some(round_off_1_decimal(mean)), true)
                    }
                }
            };
            SubjectRow {
                subject: subject.clone(),
                stages,
                final_average,
                computed,
            }
        })
        .collect()
}

pub fn report_card_model(school: &Value, s: &StudentRecord, year: Option<&str>) -> Value {
    let rows = subject_rows(&s.boletim());
    let finals: Vec<f64> = rows.iter().filter_map(|r| r.final_average).collect();
    let overall = if finals.is_empty() {
        None
    } else {
        Some(round_off_1_decimal(finals.iter().sum::<f64>() / finals.len() as f64))
    };
    let subjects: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "subject": r.subject,
                "stages": r.stages,
                "finalAverage": r.final_average,
                "computed": r.computed,
            })
        })
        .collect();
    json!({
        "kind": "reportCard",
        "school": school,
        "student": student_header(s),
        "year": year,
        "subjects": subjects,
        "overallAverage": overall,
    })
}

pub fn class_list_model(school: &Value, records: Vec<StudentRecord>, filters: &StudentFilters) -> Value {
    let page = run_query(records, filters, SortState::default(), Window::default());
    let students: Vec<Value> = page
        .rows
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "n": i + 1,
                "rm": s.rm,
                "nome": s.nome(),
                "dataNascimento": s.text(FIELD_DATA_NASCIMENTO),
                "nee": s.nee(),
                "status": s.text(FIELD_STATUS),
            })
        })
        .collect();
    json!({
        "kind": "classList",
        "school": school,
        "filters": {
            "serie": filters.serie,
            "turma": filters.turma,
            "turno": filters.turno,
        },
        "total": page.total,
        "students": students,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::grade_book_from_value;

    #[test]
    fn round_off_half_up() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(3.54), 3.5);
        assert_eq!(round_off_1_decimal(3.55), 3.6);
        assert_eq!(round_off_1_decimal(7.6666), 7.7);
    }

    #[test]
    fn stored_final_average_wins_over_computed() {
        let book = grade_book_from_value(&json!({
            "matematica": { "stage1": 6.0, "stage2": 7.0, "finalAverage": 9.0 },
            "historia": { "stage1": 6.0, "stage2": 7.0, "stage3": 8.0 },
            "artes": {}
        }));
        let rows = subject_rows(&book);
        let by = |name: &str| rows.iter().find(|r| r.subject == name).expect("row").clone();
        assert_eq!(by("matematica").final_average, Some(9.0));
        assert!(!by("matematica").computed);
        assert_eq!(by("historia").final_average, Some(7.0));
        assert!(by("historia").computed);
        assert_eq!(by("artes").final_average, None);
    }

    #[test]
    fn class_list_is_sorted_by_name_and_numbered() {
        let recs = vec![
            StudentRecord::new("2".into(), json!({ "nome": "Bia", "turma": "A" }).as_object().cloned().expect("obj")),
            StudentRecord::new("1".into(), json!({ "nome": "Ana", "turma": "A" }).as_object().cloned().expect("obj")),
            StudentRecord::new("3".into(), json!({ "nome": "Caio", "turma": "B" }).as_object().cloned().expect("obj")),
        ];
        let filters = StudentFilters { turma: Some("a".into()), ..Default::default() };
        let model = class_list_model(&json!({}), recs, &filters);
        assert_eq!(model["total"], 2);
        assert_eq!(model["students"][0]["nome"], "Ana");
        assert_eq!(model["students"][1]["n"], 2);
    }
}
