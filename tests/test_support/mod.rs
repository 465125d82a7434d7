#![allow(dead_code)]

use rust_xlsxwriter::Workbook;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ADMIN: &str = "admin-1";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_alunosd");
        let mut child = Command::new(exe)
            .env("ALUNOSD_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn alunosd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin: Some(stdin),
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawn and open a fresh workspace.
    pub fn with_workspace(prefix: &str) -> (Self, PathBuf) {
        let workspace = temp_dir(prefix);
        let mut s = Self::spawn();
        s.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        (s, workspace)
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let stdin = self.stdin.as_mut().expect("stdin open");
        writeln!(stdin, "{}", payload).expect("write request");
        stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// Result of a call that must succeed.
    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let resp = self.request(method, params);
        assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    /// Error code of a call that must fail.
    pub fn err_code(&mut self, method: &str, params: Value) -> String {
        let resp = self.request(method, params);
        assert_eq!(resp["ok"], json!(false), "{} unexpectedly succeeded: {}", method, resp);
        resp["error"]["code"].as_str().unwrap_or("").to_string()
    }

    /// First account of a workspace; always Admin.
    pub fn bootstrap_admin(&mut self) {
        let res = self.ok(
            "users.create",
            json!({ "uid": ADMIN, "displayName": "Secretaria", "email": "secretaria@escola.example" }),
        );
        assert_eq!(res["user"]["role"], "Admin");
    }

    pub fn create_user(&mut self, uid: &str, role: &str) {
        self.ok(
            "users.create",
            json!({
                "uid": uid,
                "displayName": uid,
                "email": format!("{uid}@escola.example"),
                "role": role,
                "actorUid": ADMIN
            }),
        );
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.wait();
    }
}

/// Write a single-sheet workbook. Numbers become numeric cells, strings
/// text cells, null leaves the cell empty.
pub fn write_xlsx(path: &Path, headers: &[&str], rows: &[Vec<Value>]) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    for (c, h) in headers.iter().enumerate() {
        ws.write_string(0, c as u16, *h).expect("write header");
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            let (r, c) = ((r + 1) as u32, c as u16);
            match v {
                Value::Number(n) => {
                    ws.write_number(r, c, n.as_f64().expect("f64")).expect("write number");
                }
                Value::String(s) => {
                    ws.write_string(r, c, s).expect("write string");
                }
                Value::Bool(b) => {
                    ws.write_boolean(r, c, *b).expect("write bool");
                }
                _ => {}
            }
        }
    }
    wb.save(path).expect("save workbook");
}

pub fn write_csv(path: &Path, delimiter: u8, rows: &[Vec<&str>]) {
    let mut w = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .expect("create csv");
    for row in rows {
        w.write_record(row).expect("write csv row");
    }
    w.flush().expect("flush csv");
}

/// `n` students with RM `1000 + i`, spread over two classes.
pub fn seed_students(s: &mut Sidecar, dir: &Path, n: usize) {
    let path = dir.join(format!("seed-{n}.xlsx"));
    let rows: Vec<Vec<Value>> = (0..n)
        .map(|i| {
            vec![
                json!((1000 + i).to_string()),
                json!(format!("Aluno {i:04}")),
                json!(if i % 2 == 0 { "A" } else { "B" }),
            ]
        })
        .collect();
    write_xlsx(&path, &["RM", "Nome", "Turma"], &rows);
    let res = s.ok(
        "import.students",
        json!({ "path": path.to_string_lossy(), "actorUid": ADMIN }),
    );
    assert_eq!(res["outcome"]["committedOps"], json!(n));
}
