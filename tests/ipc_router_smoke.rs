mod test_support;

use serde_json::json;
use test_support::{temp_dir, Sidecar};

const METHODS: &[&str] = &[
    "health",
    "setup.get",
    "setup.update",
    "students.count",
    "students.get",
    "students.query",
    "students.update",
    "students.deleteMany",
    "students.correctBirthDates",
    "students.exportXlsx",
    "import.preview",
    "import.students",
    "grades.import",
    "events.drain",
    "users.create",
    "users.get",
    "users.list",
    "users.setRole",
    "users.updateProfile",
    "reports.declaration",
    "reports.reportCard",
    "reports.classList",
    "backup.exportWorkspaceBundle",
    "backup.importWorkspaceBundle",
];

#[test]
fn every_method_is_routed() {
    let (mut s, _ws) = Sidecar::with_workspace("alunos-router");
    for m in METHODS {
        let resp = s.request(m, json!({}));
        if resp["ok"] == json!(false) {
            assert_ne!(resp["error"]["code"], "not_implemented", "{} not routed", m);
        }
    }
    assert_eq!(s.err_code("students.frobnicate", json!({})), "not_implemented");
}

#[test]
fn data_methods_need_a_workspace() {
    let mut s = Sidecar::spawn();
    let health = s.ok("health", json!({}));
    assert_eq!(health["workspacePath"], json!(null));
    assert_eq!(s.err_code("students.count", json!({})), "no_workspace");
    assert_eq!(s.err_code("setup.get", json!({})), "no_workspace");
    assert_eq!(s.err_code("workspace.select", json!({})), "bad_params");
}

#[test]
fn malformed_line_does_not_stop_the_loop() {
    use std::io::{BufRead, BufReader, Write};
    use std::process::{Command, Stdio};

    let mut child = Command::new(env!("CARGO_BIN_EXE_alunosd"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn");
    let mut stdin = child.stdin.take().expect("stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("stdout"));

    writeln!(stdin, "{{not json").expect("write");
    writeln!(stdin, "{}", json!({ "id": "h", "method": "health" })).expect("write");
    stdin.flush().expect("flush");

    let mut first = String::new();
    reader.read_line(&mut first).expect("read");
    let first: serde_json::Value = serde_json::from_str(first.trim()).expect("json");
    assert_eq!(first["error"]["code"], "bad_json");

    let mut second = String::new();
    reader.read_line(&mut second).expect("read");
    let second: serde_json::Value = serde_json::from_str(second.trim()).expect("json");
    assert_eq!(second["id"], "h");
    assert_eq!(second["ok"], true);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_flag_opens_at_startup() {
    use std::io::{BufRead, BufReader, Write};
    use std::process::{Command, Stdio};

    let ws = temp_dir("alunos-startup");
    let mut child = Command::new(env!("CARGO_BIN_EXE_alunosd"))
        .arg("--workspace")
        .arg(&ws)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn");
    let mut stdin = child.stdin.take().expect("stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("stdout"));
    writeln!(stdin, "{}", json!({ "id": "c", "method": "students.count" })).expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let resp: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(resp["result"]["count"], 0);
    assert!(ws.join("alunos.sqlite3").is_file());
    drop(stdin);
    let _ = child.wait();
}
