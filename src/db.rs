use crate::model::{merge_document, Document, StudentRecord};
use crate::users::{Role, UserRecord};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

pub const DB_FILE_NAME: &str = "alunos.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Student documents, keyed by RM. The document body is the JSON object
    // without the key itself.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS alunos(
            rm TEXT PRIMARY KEY,
            doc TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            uid TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Workspaces created before edits were timestamped have no updated_at.
    ensure_alunos_updated_at(conn)?;

    Ok(())
}

fn ensure_alunos_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "alunos", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE alunos ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn students_count(conn: &Connection) -> anyhow::Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM alunos", [], |r| r.get(0))?)
}

pub fn students_load_all(conn: &Connection) -> anyhow::Result<Vec<StudentRecord>> {
    let mut stmt = conn.prepare("SELECT rm, doc FROM alunos ORDER BY rm")?;
    let rows = stmt
        .query_map([], |row| {
            let rm: String = row.get(0)?;
            let doc: String = row.get(1)?;
            Ok((rm, doc))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (rm, doc) in rows {
        out.push(StudentRecord::new(rm, parse_doc(&doc)?));
    }
    Ok(out)
}

pub fn student_keys(conn: &Connection) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT rm FROM alunos")?;
    let keys = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(keys)
}

pub fn student_get(conn: &Connection, rm: &str) -> anyhow::Result<Option<StudentRecord>> {
    let doc: Option<String> = conn
        .query_row("SELECT doc FROM alunos WHERE rm = ?", [rm], |r| r.get(0))
        .optional()?;
    match doc {
        Some(d) => Ok(Some(StudentRecord::new(rm.to_string(), parse_doc(&d)?))),
        None => Ok(None),
    }
}

/// Merge `patch` into the stored document for `rm`, creating it when absent.
pub fn student_upsert_merge(conn: &Connection, rm: &str, patch: &Document) -> anyhow::Result<()> {
    let mut doc = match student_get(conn, rm)? {
        Some(existing) => existing.fields,
        None => Document::new(),
    };
    merge_document(&mut doc, patch);
    student_put(conn, rm, &doc)
}

pub fn student_put(conn: &Connection, rm: &str, doc: &Document) -> anyhow::Result<()> {
    let body = serde_json::to_string(doc)?;
    conn.execute(
        "INSERT INTO alunos(rm, doc, updated_at)
         VALUES(?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
         ON CONFLICT(rm) DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at",
        (rm, body),
    )?;
    Ok(())
}

pub fn student_delete(conn: &Connection, rm: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM alunos WHERE rm = ?", [rm])?;
    Ok(n > 0)
}

fn parse_doc(raw: &str) -> anyhow::Result<Document> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("student document is not a JSON object"),
    }
}

pub fn user_insert(conn: &Connection, user: &UserRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users(uid, display_name, email, role, created_at) VALUES(?, ?, ?, ?, ?)",
        (
            &user.uid,
            &user.display_name,
            &user.email,
            user.role.as_str(),
            &user.created_at,
        ),
    )?;
    Ok(())
}

pub fn user_get(conn: &Connection, uid: &str) -> anyhow::Result<Option<UserRecord>> {
    let row: Option<(String, String, String, String, String)> = conn
        .query_row(
            "SELECT uid, display_name, email, role, created_at FROM users WHERE uid = ?",
            [uid],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn users_list(conn: &Connection) -> anyhow::Result<Vec<UserRecord>> {
    let mut stmt = conn.prepare(
        "SELECT uid, display_name, email, role, created_at FROM users ORDER BY created_at, uid",
    )?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(user_from_row).collect()
}

pub fn user_set_role(conn: &Connection, uid: &str, role: Role) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE users SET role = ? WHERE uid = ?",
        (role.as_str(), uid),
    )?;
    Ok(n > 0)
}

pub fn user_set_display_name(conn: &Connection, uid: &str, display_name: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE users SET display_name = ? WHERE uid = ?",
        (display_name, uid),
    )?;
    Ok(n > 0)
}

fn user_from_row(row: (String, String, String, String, String)) -> anyhow::Result<UserRecord> {
    let (uid, display_name, email, role, created_at) = row;
    let role = Role::parse(&role).ok_or_else(|| anyhow::anyhow!("unknown role stored for {}: {}", uid, role))?;
    Ok(UserRecord {
        uid,
        display_name,
        email,
        role,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mem_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open memory db");
        init_schema(&conn).expect("init schema");
        conn
    }

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn upsert_merge_keeps_fields_not_in_patch() {
        let conn = mem_db();
        student_upsert_merge(&conn, "100", &doc(json!({ "nome": "Ana", "turma": "A" })))
            .expect("first upsert");
        student_upsert_merge(&conn, "100", &doc(json!({ "turma": "B" }))).expect("second upsert");

        let s = student_get(&conn, "100").expect("get").expect("exists");
        assert_eq!(s.text("nome").as_deref(), Some("Ana"));
        assert_eq!(s.text("turma").as_deref(), Some("B"));
        assert_eq!(students_count(&conn).expect("count"), 1);
    }

    #[test]
    fn settings_roundtrip_overwrites() {
        let conn = mem_db();
        assert!(settings_get_json(&conn, "setup.school").expect("get").is_none());
        settings_set_json(&conn, "setup.school", &json!({ "name": "EE Um" })).expect("set");
        settings_set_json(&conn, "setup.school", &json!({ "name": "EE Dois" })).expect("set");
        let v = settings_get_json(&conn, "setup.school").expect("get").expect("value");
        assert_eq!(v["name"], "EE Dois");
    }

    #[test]
    fn delete_reports_whether_row_existed() {
        let conn = mem_db();
        student_put(&conn, "7", &Document::new()).expect("put");
        assert!(student_delete(&conn, "7").expect("delete"));
        assert!(!student_delete(&conn, "7").expect("delete again"));
    }
}
