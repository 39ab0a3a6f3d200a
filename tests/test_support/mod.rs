#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .env_remove("TIMETABLED_WORKSPACE")
        .env_remove("TIMETABLED_ACADEMIC_YEAR")
        .env("TIMETABLED_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn timetabled");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Sends a request that must fail and returns its error object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn open_store(workspace: &Path) -> rusqlite::Connection {
    let conn = rusqlite::Connection::open(workspace.join("timetable.sqlite3")).expect("open store");
    conn.busy_timeout(Duration::from_secs(5)).expect("busy timeout");
    conn
}

/// Two schools. School `s1` has classes `c1` (7A) and `c2` (7B), teachers
/// `t1`/`t2`, and assignments `a1` (math/t1), `a2` (science/t1),
/// `a3` (science/t2). School `s2` has class `cx` and assignment `ax`.
/// Class `c1` has students `st1`, `st2` (active) and `st3` (inactive).
pub fn seed_roster(workspace: &Path) {
    let conn = open_store(workspace);
    conn.execute_batch(
        "INSERT INTO schools(id, name) VALUES ('s1', 'North'), ('s2', 'South');
         INSERT INTO classes(id, school_id, name, grade) VALUES
           ('c1', 's1', '7A', '7'), ('c2', 's1', '7B', '7'), ('cx', 's2', '9C', '9');
         INSERT INTO teachers(id, school_id, full_name) VALUES
           ('t1', 's1', 'Ada Lovelace'), ('t2', 's1', 'Alan Turing'), ('tx', 's2', 'Grace Hopper');
         INSERT INTO subjects(id, school_id, name) VALUES
           ('math', 's1', 'Mathematics'), ('sci', 's1', 'Science'), ('art', 's2', 'Art');
         INSERT INTO subject_teachers(id, subject_id, teacher_id) VALUES
           ('a1', 'math', 't1'), ('a2', 'sci', 't1'), ('a3', 'sci', 't2'), ('ax', 'art', 'tx');
         INSERT INTO students(id, school_id, class_id, full_name, active) VALUES
           ('st1', 's1', 'c1', 'Bea Brown', 1),
           ('st2', 's1', 'c1', 'Abe Adams', 1),
           ('st3', 's1', 'c1', 'Cy Clark', 0);",
    )
    .expect("seed roster");
}

/// Spawns the sidecar, selects a fresh workspace and seeds the roster.
pub fn seeded_sidecar(prefix: &str) -> (PathBuf, Child, ChildStdin, BufReader<ChildStdout>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_roster(&workspace);
    (workspace, child, stdin, reader)
}
