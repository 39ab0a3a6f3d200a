use crate::error::Result;
use crate::ipc::handlers::setup::load_schedule_policy;
use crate::ipc::helpers::{
    nullable_str, optional_bool, optional_day, optional_str, optional_time, required_day,
    required_str, required_time, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::timetable::{self, EntryPatch, NewEntry};
use rusqlite::Connection;
use serde_json::{json, Value};

fn timetable_create(conn: &Connection, params: &Value) -> Result<Value> {
    let new = NewEntry {
        school_id: required_str(params, "schoolId")?,
        class_id: required_str(params, "classId")?,
        subject_teacher_id: optional_str(params, "subjectTeacherId")?,
        day_of_week: required_day(params, "dayOfWeek")?,
        start_time: required_time(params, "startTime")?,
        end_time: required_time(params, "endTime")?,
        is_active: optional_bool(params, "isActive")?.unwrap_or(true),
    };
    let entry = timetable::create_entry(conn, new)?;
    Ok(json!({ "timetable": entry }))
}

fn timetable_update(conn: &Connection, params: &Value) -> Result<Value> {
    let id = required_str(params, "id")?;
    let patch = EntryPatch {
        class_id: optional_str(params, "classId")?,
        subject_teacher_id: nullable_str(params, "subjectTeacherId")?,
        day_of_week: optional_day(params, "dayOfWeek")?,
        start_time: optional_time(params, "startTime")?,
        end_time: optional_time(params, "endTime")?,
        is_active: optional_bool(params, "isActive")?,
    };
    let entry = timetable::update_entry(conn, &id, patch)?;
    Ok(json!({ "timetable": entry }))
}

fn timetable_assign_teacher(conn: &Connection, params: &Value) -> Result<Value> {
    let id = required_str(params, "id")?;
    let subject_teacher_id = required_str(params, "subjectTeacherId")?;
    let is_active = optional_bool(params, "isActive")?;
    let entry = timetable::reassign_teacher(conn, &id, &subject_teacher_id, is_active)?;
    Ok(json!({ "timetable": entry }))
}

fn timetable_generate_weekly(conn: &Connection, params: &Value) -> Result<Value> {
    let school_id = required_str(params, "schoolId")?;
    let policy = load_schedule_policy(conn)?;
    let outcome = timetable::generate_weekly_grid(conn, &policy, &school_id)?;
    Ok(serde_json::to_value(outcome)?)
}

fn timetable_get(conn: &Connection, params: &Value) -> Result<Value> {
    let id = required_str(params, "id")?;
    Ok(json!({ "timetable": timetable::get_entry(conn, &id)? }))
}

fn timetable_list_by_class(conn: &Connection, params: &Value) -> Result<Value> {
    let school_id = required_str(params, "schoolId")?;
    let class_id = required_str(params, "classId")?;
    let entries = timetable::list_by_class(conn, &school_id, &class_id)?;
    Ok(json!({ "timetables": entries }))
}

fn timetable_list_by_teacher(conn: &Connection, params: &Value) -> Result<Value> {
    let school_id = required_str(params, "schoolId")?;
    let teacher_id = required_str(params, "teacherId")?;
    let entries = timetable::list_by_teacher(conn, &school_id, &teacher_id)?;
    Ok(json!({ "timetables": entries }))
}

fn timetable_delete(conn: &Connection, params: &Value) -> Result<Value> {
    let id = required_str(params, "id")?;
    timetable::delete_entry(conn, &id)?;
    Ok(json!({ "ok": true, "id": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let op: fn(&Connection, &Value) -> Result<Value> = match req.method.as_str() {
        "timetable.create" => timetable_create,
        "timetable.update" => timetable_update,
        "timetable.assignTeacher" => timetable_assign_teacher,
        "timetable.generateWeekly" => timetable_generate_weekly,
        "timetable.get" => timetable_get,
        "timetable.listByClass" => timetable_list_by_class,
        "timetable.listByTeacher" => timetable_list_by_teacher,
        "timetable.delete" => timetable_delete,
        _ => return None,
    };
    Some(with_db(state, req, op))
}

