mod test_support;

use serde_json::json;
use test_support::{error_code, request_err, request_ok, seeded_sidecar};

#[test]
fn overlapping_class_slot_is_rejected_but_touching_slot_is_not() {
    let (_workspace, _child, mut stdin, mut reader) = seeded_sidecar("timetabled-class-conflicts");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1", "subjectTeacherId": "a1",
            "dayOfWeek": "MONDAY", "startTime": "07:00", "endTime": "08:00"
        }),
    );
    let first_id = first["timetable"]["id"].as_str().expect("id").to_string();
    assert_eq!(first["timetable"]["startTime"], "07:00");
    assert_eq!(first["timetable"]["class"]["name"], "7A");
    assert_eq!(first["timetable"]["subjectTeacher"]["teacherFullname"], "Ada Lovelace");
    assert_eq!(first["timetable"]["isActive"], true);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1",
            "dayOfWeek": "MONDAY", "startTime": "07:30", "endTime": "08:30"
        }),
    );
    assert_eq!(error_code(&error), "conflict");
    assert_eq!(error["details"]["scope"], "class");
    assert_eq!(error["details"]["conflictingTimetableId"], first_id.as_str());
    assert_eq!(error["details"]["startTime"], "07:00");

    let touching = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1",
            "dayOfWeek": "MONDAY", "startTime": "08:00", "endTime": "09:00"
        }),
    );
    assert_eq!(touching["timetable"]["subjectTeacher"], serde_json::Value::Null);

    // Same time on another weekday is free.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1",
            "dayOfWeek": "TUESDAY", "startTime": "07:30", "endTime": "08:30"
        }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.listByClass",
        json!({ "schoolId": "s1", "classId": "c1" }),
    );
    let rows = listed["timetables"].as_array().expect("timetables");
    let order: Vec<(&str, &str)> = rows
        .iter()
        .map(|r| (r["dayOfWeek"].as_str().unwrap_or(""), r["startTime"].as_str().unwrap_or("")))
        .collect();
    assert_eq!(
        order,
        vec![("MONDAY", "07:00"), ("MONDAY", "08:00"), ("TUESDAY", "07:30")]
    );
}

#[test]
fn invalid_times_and_foreign_school_references_are_rejected() {
    let (_workspace, _child, mut stdin, mut reader) = seeded_sidecar("timetabled-create-validation");

    let inverted = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1",
            "dayOfWeek": "MONDAY", "startTime": "09:00", "endTime": "08:00"
        }),
    );
    assert_eq!(error_code(&inverted), "bad_params");

    let sunday = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1",
            "dayOfWeek": "SUNDAY", "startTime": "07:00", "endTime": "08:00"
        }),
    );
    assert_eq!(error_code(&sunday), "bad_params");

    let missing_class = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "nope",
            "dayOfWeek": "MONDAY", "startTime": "07:00", "endTime": "08:00"
        }),
    );
    assert_eq!(error_code(&missing_class), "not_found");

    let foreign_class = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "cx",
            "dayOfWeek": "MONDAY", "startTime": "07:00", "endTime": "08:00"
        }),
    );
    assert_eq!(error_code(&foreign_class), "conflict");

    let foreign_assignment = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1", "subjectTeacherId": "ax",
            "dayOfWeek": "MONDAY", "startTime": "07:00", "endTime": "08:00"
        }),
    );
    assert_eq!(error_code(&foreign_assignment), "conflict");
}

#[test]
fn partial_update_keeps_unspecified_fields_and_ignores_itself() {
    let (_workspace, _child, mut stdin, mut reader) = seeded_sidecar("timetabled-partial-update");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1", "subjectTeacherId": "a1",
            "dayOfWeek": "WEDNESDAY", "startTime": "10:00", "endTime": "11:30"
        }),
    );
    let id = created["timetable"]["id"].as_str().expect("id").to_string();

    // Shrinking inside its own old range must not collide with itself.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.update",
        json!({ "id": id.clone(), "startTime": "10:30" }),
    );
    assert_eq!(updated["timetable"]["startTime"], "10:30");
    assert_eq!(updated["timetable"]["endTime"], "11:30");
    assert_eq!(updated["timetable"]["dayOfWeek"], "WEDNESDAY");
    assert_eq!(updated["timetable"]["subjectTeacherId"], "a1");

    let inverted = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.update",
        json!({ "id": id.clone(), "endTime": "10:00" }),
    );
    assert_eq!(error_code(&inverted), "bad_params");

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.update",
        json!({ "id": id.clone(), "subjectTeacherId": null, "isActive": false }),
    );
    assert_eq!(cleared["timetable"]["subjectTeacherId"], serde_json::Value::Null);
    assert_eq!(cleared["timetable"]["isActive"], false);
    assert_eq!(cleared["timetable"]["startTime"], "10:30");

    let missing = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.update",
        json!({ "id": "missing", "startTime": "07:00" }),
    );
    assert_eq!(error_code(&missing), "not_found");
}

#[test]
fn moving_an_entry_to_another_class_is_checked_against_that_class() {
    let (_workspace, _child, mut stdin, mut reader) = seeded_sidecar("timetabled-class-move");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c1",
            "dayOfWeek": "TUESDAY", "startTime": "08:00", "endTime": "09:00"
        }),
    );
    let first_id = first["timetable"]["id"].as_str().expect("id").to_string();
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.create",
        json!({
            "schoolId": "s1", "classId": "c2",
            "dayOfWeek": "TUESDAY", "startTime": "08:30", "endTime": "09:30"
        }),
    );
    let other_id = other["timetable"]["id"].as_str().expect("id").to_string();

    let foreign = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.update",
        json!({ "id": other_id.clone(), "classId": "cx" }),
    );
    assert_eq!(error_code(&foreign), "conflict");

    let occupied = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.update",
        json!({ "id": other_id.clone(), "classId": "c1" }),
    );
    assert_eq!(error_code(&occupied), "conflict");
    assert_eq!(occupied["details"]["scope"], "class");
    assert_eq!(occupied["details"]["conflictingTimetableId"], first_id.as_str());

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.update",
        json!({ "id": other_id.clone(), "classId": "c1", "startTime": "09:00" }),
    );
    assert_eq!(moved["timetable"]["classId"], "c1");
    assert_eq!(moved["timetable"]["class"]["name"], "7A");
    assert_eq!(moved["timetable"]["startTime"], "09:00");
    assert_eq!(moved["timetable"]["endTime"], "09:30");
}
