use std::cmp::Ordering;

/// Accented letters that show up in Portuguese school sheets, folded to
/// their base letter. Input must already be lowercase.
pub fn fold_accent(c: char) -> char {
    match c {
        'ç' => 'c',
        'ã' | 'á' | 'à' | 'â' | 'ä' => 'a',
        'é' | 'ê' | 'è' | 'ë' => 'e',
        'í' | 'î' | 'ì' | 'ï' => 'i',
        'õ' | 'ó' | 'ô' | 'ò' | 'ö' => 'o',
        'ú' | 'û' | 'ù' | 'ü' => 'u',
        'ñ' => 'n',
        other => other,
    }
}

/// Lowercase and strip accents; used for matching and collation.
pub fn fold(s: &str) -> String {
    s.to_lowercase().chars().map(fold_accent).collect()
}

/// Case/accent-insensitive comparison where runs of digits compare by
/// numeric value ("6A" < "10A", "Turma 2" < "Turma 10").
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let fa = fold(a);
    let fb = fold(b);
    let mut ia = fa.chars().peekable();
    let mut ib = fb.chars().peekable();

    loop {
        match (ia.peek().copied(), ib.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let da = take_digits(&mut ia);
                let db = take_digits(&mut ib);
                let ord = cmp_digit_runs(&da, &db);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                if ca != cb {
                    return ca.cmp(&cb);
                }
                ia.next();
                ib.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = it.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        out.push(c);
        it.next();
    }
    out
}

fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let ta = a.trim_start_matches('0');
    let tb = b.trim_start_matches('0');
    ta.len()
        .cmp(&tb.len())
        .then_with(|| ta.cmp(tb))
        .then_with(|| a.len().cmp(&b.len()))
}
