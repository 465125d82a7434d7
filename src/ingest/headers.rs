use crate::model::FIELD_RM;
use crate::text::fold_accent;

/// Spellings seen in school sheets, after normalization, mapped to the
/// canonical student keys. No target appears as a source.
const SYNONYMS: &[(&str, &str)] = &[
    ("nome_do_registro_civil", "nome"),
    ("nome_registro_civil", "nome"),
    ("nome_civil", "nome"),
    ("nome_do_aluno", "nome"),
    ("nome_da_aluna", "nome"),
    ("nome_completo", "nome"),
    ("aluno", "nome"),
    ("aluna", "nome"),
    ("estudante", "nome"),
    ("matricula", "rm"),
    ("n_matricula", "rm"),
    ("n_de_matricula", "rm"),
    ("numero_de_matricula", "rm"),
    ("numero_matricula", "rm"),
    ("registro_de_matricula", "rm"),
    ("n_rm", "rm"),
    ("numero_rm", "rm"),
    ("telefone", "telefones"),
    ("telefone_s", "telefones"),
    ("fone", "telefones"),
    ("fones", "telefones"),
    ("tel", "telefones"),
    ("celular", "telefones"),
    ("celulares", "telefones"),
    ("contato", "telefones"),
    ("contatos", "telefones"),
    ("data_de_nascimento", "data_nascimento"),
    ("data_nasc", "data_nascimento"),
    ("dt_nascimento", "data_nascimento"),
    ("dt_nasc", "data_nascimento"),
    ("nascimento", "data_nascimento"),
    ("nome_da_mae", "nome_mae"),
    ("mae", "nome_mae"),
    ("filiacao_1", "nome_mae"),
    ("nome_do_pai", "nome_pai"),
    ("pai", "nome_pai"),
    ("filiacao_2", "nome_pai"),
    ("nome_do_responsavel", "responsavel"),
    ("responsavel_legal", "responsavel"),
    ("endereco_completo", "endereco"),
    ("logradouro", "endereco"),
    ("ano", "serie"),
    ("ano_serie", "serie"),
    ("serie_ano", "serie"),
    ("classe", "turma"),
    ("sala", "turma"),
    ("periodo", "turno"),
    ("nivel", "ensino"),
    ("nivel_de_ensino", "ensino"),
    ("tipo_de_ensino", "ensino"),
    ("modalidade", "ensino"),
    ("necessidades_especiais", "nee"),
    ("necessidade_especial", "nee"),
    ("aluno_nee", "nee"),
    ("possui_nee", "nee"),
    ("descricao_nee", "nee_descricao"),
    ("descricao_da_nee", "nee_descricao"),
    ("qual_nee", "nee_descricao"),
    ("situacao", "status"),
    ("situacao_da_matricula", "status"),
];

/// Lowercase, fold accents, drop ordinal markers and periods, join words
/// with `_`, then resolve synonyms.
pub fn normalize_header(raw: &str) -> String {
    resolve_synonym(&normalize_key(raw)).to_string()
}

/// Header normalization without synonym resolution; grade-book subjects
/// use this so they match the subjects split out of `boletim_*` columns.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().to_lowercase().chars().map(fold_accent) {
        match c {
            'º' | 'ª' | '°' | '.' => {}
            c if c.is_whitespace() || c == '_' || c == '-' || c == '/' => pending_sep = true,
            c => {
                if pending_sep && !out.is_empty() {
                    out.push('_');
                }
                pending_sep = false;
                out.push(c);
            }
        }
    }
    out
}

fn resolve_synonym(key: &str) -> &str {
    SYNONYMS
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| *to)
        .unwrap_or(key)
}

pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    raw.iter().map(|h| normalize_header(h)).collect()
}

/// Index of the registration column, if the sheet has one.
pub fn rm_column(headers: &[String]) -> Option<usize> {
    headers.iter().position(|h| h == FIELD_RM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CANONICAL_FIELDS;

    #[test]
    fn normalizes_common_sheet_headers() {
        assert_eq!(normalize_header("RM"), "rm");
        assert_eq!(normalize_header("R.M."), "rm");
        assert_eq!(normalize_header("Nº de Matrícula"), "rm");
        assert_eq!(normalize_header("Nome do Registro Civil"), "nome");
        assert_eq!(normalize_header("  Telefone  "), "telefones");
        assert_eq!(normalize_header("Data de Nascimento"), "data_nascimento");
        assert_eq!(normalize_header("Série"), "serie");
        assert_eq!(normalize_header("Endereço"), "endereco");
        assert_eq!(normalize_header("Situação"), "status");
        assert_eq!(normalize_header("1ª Etapa"), "1_etapa");
    }

    #[test]
    fn unknown_headers_pass_through_normalized() {
        assert_eq!(normalize_header("Cor   da Pele"), "cor_da_pele");
        assert_eq!(normalize_header("Transporte-Escolar"), "transporte_escolar");
        assert_eq!(normalize_header(""), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "RM",
            "Nome do Registro Civil",
            "Telefone",
            "Nº de Matrícula",
            "Ano / Série",
            "Cor da Pele",
            "boletim_Matemática_1ª etapa",
            "__weird  header__",
        ];
        for s in samples {
            let once = normalize_header(s);
            assert_eq!(normalize_header(&once), once, "header {:?}", s);
        }
        for key in CANONICAL_FIELDS {
            assert_eq!(normalize_header(key), key);
        }
    }

    #[test]
    fn synonym_targets_are_never_sources() {
        for (_, to) in SYNONYMS {
            assert!(
                SYNONYMS.iter().all(|(from, _)| from != to),
                "target {} is also a source",
                to
            );
            assert_eq!(normalize_header(to), *to);
        }
    }

    #[test]
    fn rm_column_found_after_normalization() {
        let headers = normalize_headers(&["Nome".to_string(), "Matrícula".to_string()]);
        assert_eq!(rm_column(&headers), Some(1));
        let headers = normalize_headers(&["Nome".to_string()]);
        assert_eq!(rm_column(&headers), None);
    }
}
