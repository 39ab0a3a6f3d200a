use crate::error::{Result, ScheduleError};
use crate::ipc::error::{err, fail, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{DayOfWeek, Semester, WallTime};
use rusqlite::Connection;
use serde_json::Value;

/// Runs `op` against the open workspace and wraps the outcome in a response
/// envelope.
pub fn with_db<F>(state: &AppState, req: &Request, op: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match op(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String> {
    match params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(ScheduleError::invalid(format!("{} must not be empty", key))),
        Some(Value::Null) | None => Err(ScheduleError::invalid(format!("missing {}", key))),
        Some(_) => Err(ScheduleError::invalid(format!("{} must be string", key))),
    }
}

pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>> {
    match params.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(_) => required_str(params, key).map(Some),
    }
}

/// Absent keeps the stored value, `null` clears it.
pub fn nullable_str(params: &Value, key: &str) -> Result<Option<Option<String>>> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(_) => required_str(params, key).map(|s| Some(Some(s))),
    }
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>> {
    match params.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ScheduleError::invalid(format!("{} must be boolean", key))),
    }
}

pub fn optional_i32(params: &Value, key: &str) -> Result<Option<i32>> {
    match params.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(v) => v
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ScheduleError::invalid(format!("{} must be integer", key))),
    }
}

pub fn optional_day(params: &Value, key: &str) -> Result<Option<DayOfWeek>> {
    optional_str(params, key)?
        .map(|s| {
            DayOfWeek::parse(&s).ok_or_else(|| {
                ScheduleError::invalid(format!("{} must be one of MONDAY..SATURDAY", key))
            })
        })
        .transpose()
}

pub fn required_day(params: &Value, key: &str) -> Result<DayOfWeek> {
    optional_day(params, key)?.ok_or_else(|| ScheduleError::invalid(format!("missing {}", key)))
}

pub fn optional_time(params: &Value, key: &str) -> Result<Option<WallTime>> {
    optional_str(params, key)?
        .map(|s| {
            WallTime::parse(&s)
                .ok_or_else(|| ScheduleError::invalid(format!("{} must be HH:mm", key)))
        })
        .transpose()
}

pub fn required_time(params: &Value, key: &str) -> Result<WallTime> {
    optional_time(params, key)?.ok_or_else(|| ScheduleError::invalid(format!("missing {}", key)))
}

pub fn required_semester(params: &Value, key: &str) -> Result<Semester> {
    let s = required_str(params, key)?;
    Semester::parse(&s).ok_or_else(|| {
        ScheduleError::invalid(format!("{} must be SEMESTER_1 or SEMESTER_2", key))
    })
}
