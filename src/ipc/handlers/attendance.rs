use crate::details::{self, AttendanceStatus, DetailUpdate};
use crate::error::{Result, ScheduleError};
use crate::ipc::handlers::setup::load_schedule_policy;
use crate::ipc::helpers::{optional_bool, optional_i32, optional_str, required_semester, required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::sessions;
use chrono::Datelike;
use rusqlite::Connection;
use serde_json::{json, Value};

fn sessions_generate(conn: &Connection, params: &Value, default_year: Option<i32>) -> Result<Value> {
    let class_id = required_str(params, "classId")?;
    let assignment_id = required_str(params, "subjectTeacherId")?;
    let semester = required_semester(params, "semester")?;
    let year = optional_i32(params, "year")?
        .or(default_year)
        .unwrap_or_else(|| chrono::Local::now().year());
    let policy = load_schedule_policy(conn)?;
    let outcome = sessions::expand_sessions(conn, &policy, &class_id, &assignment_id, semester, year)?;
    Ok(serde_json::to_value(outcome)?)
}

fn sessions_delete(conn: &Connection, params: &Value) -> Result<Value> {
    let class_id = required_str(params, "classId")?;
    let assignment_id = required_str(params, "subjectTeacherId")?;
    let semester = required_semester(params, "semester")?;
    let deleted = sessions::delete_sessions(conn, &class_id, &assignment_id, semester)?;
    Ok(json!({
        "deleted": deleted,
        "classId": class_id,
        "subjectTeacherId": assignment_id,
        "semester": semester,
    }))
}

fn sessions_list(conn: &Connection, params: &Value) -> Result<Value> {
    let class_id = required_str(params, "classId")?;
    let assignment_id = required_str(params, "subjectTeacherId")?;
    let semester = required_semester(params, "semester")?;
    let listing = sessions::list_sessions(conn, &class_id, &assignment_id, semester)?;
    Ok(serde_json::to_value(listing)?)
}

fn parse_status(raw: &str, key: &str) -> Result<AttendanceStatus> {
    AttendanceStatus::parse(raw).ok_or_else(|| {
        ScheduleError::invalid(format!("{} must be one of PRESENT, ABSENT, SICK, EXCUSED", key))
    })
}

fn details_create(conn: &Connection, params: &Value) -> Result<Value> {
    let attendance_id = required_str(params, "attendanceId")?;
    let student_ids = match params.get("studentIds") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ScheduleError::invalid("studentIds must be strings"))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(_) => return Err(ScheduleError::invalid("studentIds must be an array")),
    };
    let status = match optional_str(params, "defaultStatus")? {
        Some(s) => parse_status(&s, "defaultStatus")?,
        None => AttendanceStatus::Present,
    };
    let created = details::create_details(conn, &attendance_id, student_ids, status)?;
    Ok(json!({ "created": created, "attendanceId": attendance_id }))
}

fn details_get(conn: &Connection, params: &Value) -> Result<Value> {
    let attendance_id = required_str(params, "attendanceId")?;
    Ok(serde_json::to_value(details::session_details(conn, &attendance_id)?)?)
}

fn details_update(conn: &Connection, params: &Value) -> Result<Value> {
    let attendance_id = required_str(params, "attendanceId")?;
    let Some(items) = params.get("updates").and_then(|v| v.as_array()) else {
        return Err(ScheduleError::invalid("updates must be an array"));
    };
    let mut updates = Vec::with_capacity(items.len());
    for item in items {
        let status = match optional_str(item, "status")? {
            Some(s) => Some(parse_status(&s, "status")?),
            None => None,
        };
        let note = match item.get("note") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ScheduleError::invalid("note must be string")),
        };
        updates.push(DetailUpdate {
            student_id: required_str(item, "studentId")?,
            status,
            note,
        });
    }
    let approve = optional_bool(params, "approve")?.unwrap_or(true);
    let result = details::update_details(conn, &attendance_id, &updates, approve)?;
    Ok(serde_json::to_value(result)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let op: fn(&Connection, &Value) -> Result<Value> = match req.method.as_str() {
        "attendance.sessions.generate" => {
            let default_year = state.config.academic_year;
            return Some(with_db(state, req, |conn, params| {
                sessions_generate(conn, params, default_year)
            }));
        }
        "attendance.sessions.delete" => sessions_delete,
        "attendance.sessions.list" => sessions_list,
        "attendance.details.create" => details_create,
        "attendance.details.get" => details_get,
        "attendance.details.update" => details_update,
        _ => return None,
    };
    Some(with_db(state, req, op))
}
