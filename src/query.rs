use crate::model::{
    StudentRecord, FIELD_DATA_NASCIMENTO, FIELD_NOME, FIELD_SERIE, FIELD_STATUS, FIELD_TURMA,
    FIELD_TURNO,
};
use crate::text::{fold, natural_cmp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// All predicates are ANDed; `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentFilters {
    pub name: Option<String>,
    pub serie: Option<String>,
    pub turma: Option<String>,
    pub turno: Option<String>,
    pub nee: Option<bool>,
}

impl StudentFilters {
    pub fn matches(&self, s: &StudentRecord) -> bool {
        if let Some(needle) = self.name.as_deref().map(fold) {
            let needle = needle.trim();
            if !needle.is_empty() && !fold(&s.nome()).contains(needle) {
                return false;
            }
        }
        if !field_equals(s, FIELD_SERIE, self.serie.as_deref())
            || !field_equals(s, FIELD_TURMA, self.turma.as_deref())
            || !field_equals(s, FIELD_TURNO, self.turno.as_deref())
        {
            return false;
        }
        if let Some(want) = self.nee {
            if s.nee() != want {
                return false;
            }
        }
        true
    }
}

fn field_equals(s: &StudentRecord, key: &str, want: Option<&str>) -> bool {
    let Some(want) = want.map(str::trim).filter(|w| !w.is_empty()) else {
        return true;
    };
    match s.text(key) {
        Some(have) => fold(&have) == fold(want),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Nome,
    Rm,
    Serie,
    Turma,
    Turno,
    Nee,
    Status,
    DataNascimento,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<SortKey> {
        match raw.trim() {
            "nome" | "name" => Some(SortKey::Nome),
            "rm" => Some(SortKey::Rm),
            "serie" => Some(SortKey::Serie),
            "turma" => Some(SortKey::Turma),
            "turno" => Some(SortKey::Turno),
            "nee" => Some(SortKey::Nee),
            "status" => Some(SortKey::Status),
            "data_nascimento" | "dataNascimento" => Some(SortKey::DataNascimento),
            _ => None,
        }
    }

    fn field(self) -> &'static str {
        match self {
            SortKey::Nome => FIELD_NOME,
            SortKey::Rm => crate::model::FIELD_RM,
            SortKey::Serie => FIELD_SERIE,
            SortKey::Turma => FIELD_TURMA,
            SortKey::Turno => FIELD_TURNO,
            SortKey::Nee => crate::model::FIELD_NEE,
            SortKey::Status => FIELD_STATUS,
            SortKey::DataNascimento => FIELD_DATA_NASCIMENTO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<SortDirection> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Asc),
            "desc" | "descending" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    fn flipped(self) -> SortDirection {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            key: SortKey::Nome,
            direction: SortDirection::Asc,
        }
    }
}

impl SortState {
    /// Same key flips the direction; a new key starts ascending.
    pub fn select(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = self.direction.flipped();
        } else {
            self.key = key;
            self.direction = SortDirection::Asc;
        }
    }
}

fn compare_key(a: &StudentRecord, b: &StudentRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Nee => a.nee().cmp(&b.nee()),
        SortKey::DataNascimento => {
            let da = a.text(key.field()).and_then(|s| crate::dates::parse_br(&s));
            let db = b.text(key.field()).and_then(|s| crate::dates::parse_br(&s));
            match (da, db) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => natural_cmp(
                    &a.text(key.field()).unwrap_or_default(),
                    &b.text(key.field()).unwrap_or_default(),
                ),
            }
        }
        _ => natural_cmp(
            &a.text(key.field()).unwrap_or_default(),
            &b.text(key.field()).unwrap_or_default(),
        ),
    }
}

/// Primary key, then name, then RM. Descending is the exact reverse.
pub fn compare(a: &StudentRecord, b: &StudentRecord, sort: SortState) -> Ordering {
    let ord = compare_key(a, b, sort.key)
        .then_with(|| natural_cmp(&a.nome(), &b.nome()))
        .then_with(|| a.nome().cmp(&b.nome()))
        .then_with(|| natural_cmp(&a.rm, &b.rm))
        .then_with(|| a.rm.cmp(&b.rm));
    match sort.direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

pub fn sort_records(records: &mut [StudentRecord], sort: SortState) {
    records.sort_by(|a, b| compare(a, b, sort));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    /// Matches before windowing.
    pub total: usize,
    pub rows: Vec<StudentRecord>,
}

pub fn run_query(
    records: Vec<StudentRecord>,
    filters: &StudentFilters,
    sort: SortState,
    window: Window,
) -> QueryPage {
    let mut matched: Vec<StudentRecord> =
        records.into_iter().filter(|s| filters.matches(s)).collect();
    sort_records(&mut matched, sort);
    let total = matched.len();
    let rows: Vec<StudentRecord> = match window.limit {
        Some(limit) => matched.into_iter().skip(window.offset).take(limit).collect(),
        None => matched.into_iter().skip(window.offset).collect(),
    };
    QueryPage { total, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(rm: &str, v: serde_json::Value) -> StudentRecord {
        StudentRecord::new(rm.to_string(), v.as_object().cloned().expect("object"))
    }

    fn sample() -> Vec<StudentRecord> {
        vec![
            rec("1", json!({ "nome": "Ana Souza", "serie": "6", "turma": "A", "turno": "Manhã", "nee": true })),
            rec("2", json!({ "nome": "Bruno Lima", "serie": "10", "turma": "B", "turno": "Tarde", "nee": false })),
            rec("3", json!({ "nome": "Álvaro Ana", "serie": "6", "turma": "B", "turno": "manha" })),
            rec("4", json!({ "nome": "Carla Anaya", "serie": "7", "turma": "A", "nee": true })),
            rec("5", json!({ "nome": "Diego", "serie": "6", "turma": "A", "nee": "SIM" })),
        ]
    }

    fn rms(rows: &[StudentRecord]) -> Vec<&str> {
        rows.iter().map(|r| r.rm.as_str()).collect()
    }

    #[test]
    fn nee_and_name_filters_intersect() {
        let filters = StudentFilters {
            name: Some("ana".into()),
            nee: Some(true),
            ..Default::default()
        };
        let page = run_query(sample(), &filters, SortState::default(), Window::default());
        assert_eq!(rms(&page.rows), vec!["1", "4"]);

        let by_name = run_query(
            sample(),
            &StudentFilters { name: Some("ana".into()), ..Default::default() },
            SortState::default(),
            Window::default(),
        );
        let by_nee = run_query(
            sample(),
            &StudentFilters { nee: Some(true), ..Default::default() },
            SortState::default(),
            Window::default(),
        );
        for r in &page.rows {
            assert!(by_name.rows.contains(r) && by_nee.rows.contains(r));
        }
        let both = by_name.rows.iter().filter(|r| by_nee.rows.contains(r)).count();
        assert_eq!(both, page.total);
    }

    #[test]
    fn exact_filters_fold_case_and_accents() {
        let filters = StudentFilters {
            turno: Some("MANHA".into()),
            ..Default::default()
        };
        let page = run_query(sample(), &filters, SortState::default(), Window::default());
        assert_eq!(rms(&page.rows), vec!["3", "1"]);
    }

    #[test]
    fn grade_sort_is_numeric_and_reverses_exactly() {
        let asc = SortState { key: SortKey::Serie, direction: SortDirection::Asc };
        let desc = SortState { key: SortKey::Serie, direction: SortDirection::Desc };
        let a = run_query(sample(), &StudentFilters::default(), asc, Window::default());
        let d = run_query(sample(), &StudentFilters::default(), desc, Window::default());
        // serie 6 ties broken by name: Álvaro, Ana, Diego.
        assert_eq!(rms(&a.rows), vec!["3", "1", "5", "4", "2"]);
        let mut reversed = rms(&d.rows);
        reversed.reverse();
        assert_eq!(rms(&a.rows), reversed);
    }

    #[test]
    fn nee_sort_puts_false_first() {
        let asc = SortState { key: SortKey::Nee, direction: SortDirection::Asc };
        let page = run_query(sample(), &StudentFilters::default(), asc, Window::default());
        assert_eq!(rms(&page.rows), vec!["3", "2", "1", "4", "5"]);
    }

    #[test]
    fn selecting_same_key_toggles_direction() {
        let mut s = SortState::default();
        s.select(SortKey::Turma);
        assert_eq!(s, SortState { key: SortKey::Turma, direction: SortDirection::Asc });
        s.select(SortKey::Turma);
        assert_eq!(s.direction, SortDirection::Desc);
        s.select(SortKey::Turma);
        assert_eq!(s.direction, SortDirection::Asc);
        s.select(SortKey::Turma);
        s.select(SortKey::Nome);
        assert_eq!(s, SortState { key: SortKey::Nome, direction: SortDirection::Asc });
    }

    #[test]
    fn window_slices_after_filter_and_sort() {
        let page = run_query(
            sample(),
            &StudentFilters::default(),
            SortState::default(),
            Window { offset: 1, limit: Some(2) },
        );
        assert_eq!(page.total, 5);
        assert_eq!(rms(&page.rows), vec!["1", "2"]);
        let past_end = run_query(
            sample(),
            &StudentFilters::default(),
            SortState::default(),
            Window { offset: 10, limit: Some(2) },
        );
        assert_eq!(past_end.total, 5);
        assert!(past_end.rows.is_empty());
    }

    #[test]
    fn sort_key_parse_accepts_both_spellings() {
        assert_eq!(SortKey::parse("dataNascimento"), Some(SortKey::DataNascimento));
        assert_eq!(SortKey::parse("name"), Some(SortKey::Nome));
        assert_eq!(SortKey::parse("boletim"), None);
    }
}
