mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("timetabled-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["workspacePath"], serde_json::Value::Null);

    let before = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.listByClass",
        json!({ "schoolId": "s1", "classId": "c1" }),
    );
    assert_eq!(error_code(&before), "no_workspace");

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["workspacePath"], workspace.to_string_lossy().as_ref());
    assert!(workspace.join("timetable.sqlite3").exists());

    for (id, method, params) in [
        ("4", "timetable.get", json!({ "id": "missing" })),
        ("5", "timetable.update", json!({ "id": "missing" })),
        ("6", "timetable.assignTeacher", json!({ "id": "missing", "subjectTeacherId": "x" })),
        ("7", "timetable.delete", json!({ "id": "missing" })),
        ("8", "timetable.listByTeacher", json!({ "schoolId": "s1", "teacherId": "missing" })),
        ("9", "attendance.sessions.list", json!({ "classId": "c1", "subjectTeacherId": "a1", "semester": "SEMESTER_1" })),
        ("10", "attendance.details.get", json!({ "attendanceId": "missing" })),
    ] {
        let e = request_err(&mut stdin, &mut reader, id, method, params);
        assert_eq!(error_code(&e), "not_found", "{}", method);
    }

    let missing_param = request_err(&mut stdin, &mut reader, "11", "timetable.create", json!({}));
    assert_eq!(error_code(&missing_param), "bad_params");

    let _ = request_ok(&mut stdin, &mut reader, "12", "setup.get", json!({}));

    let unknown = request(&mut stdin, &mut reader, "13", "timetable.explode", json!({}));
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"]["code"], "not_implemented");

    // A malformed line is answered and the loop keeps serving.
    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse bad_json response");
    assert_eq!(bad["error"]["code"], "bad_json");

    let health = request_ok(&mut stdin, &mut reader, "14", "health", json!({}));
    assert_eq!(health["workspacePath"], workspace.to_string_lossy().as_ref());

    drop(stdin);
    let status = child.wait().expect("wait for sidecar");
    assert!(status.success());
}
