//! Per-student attendance marks recorded against an expanded session.

use crate::db;
use crate::error::{Result, ScheduleError};
use crate::roster;
use crate::schedule::missing_keys;
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Sick,
    Excused,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRESENT" => Some(Self::Present),
            "ABSENT" => Some(Self::Absent),
            "SICK" => Some(Self::Sick),
            "EXCUSED" => Some(Self::Excused),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "PRESENT",
            Self::Absent => "ABSENT",
            Self::Sick => "SICK",
            Self::Excused => "EXCUSED",
        }
    }
}

impl ToSql for AttendanceStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AttendanceStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).ok_or_else(|| FromSqlError::Other(format!("bad attendance status: {s}").into()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRow {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub attendance_id: String,
    pub date: NaiveDate,
    pub approve: bool,
    pub details: Vec<DetailRow>,
}

#[derive(Debug, Clone)]
pub struct DetailUpdate {
    pub student_id: String,
    pub status: Option<AttendanceStatus>,
    pub note: Option<String>,
}

struct SessionHead {
    date: NaiveDate,
    approve: bool,
    class_id: String,
}

fn require_session(conn: &Connection, attendance_id: &str) -> Result<SessionHead> {
    conn.query_row(
        "SELECT a.date, a.approve, t.class_id
         FROM attendances a
         JOIN timetables t ON t.id = a.timetable_id
         WHERE a.id = ?",
        [attendance_id],
        |r| {
            Ok(SessionHead {
                date: r.get(0)?,
                approve: r.get::<_, i64>(1)? != 0,
                class_id: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| ScheduleError::not_found(format!("attendance {} not found", attendance_id)))
}

/// Seeds one detail per student not yet marked for the session. Without an
/// explicit list the active roster of the session's class is used.
pub fn create_details(
    conn: &Connection,
    attendance_id: &str,
    student_ids: Option<Vec<String>>,
    default_status: AttendanceStatus,
) -> Result<usize> {
    let tx = db::begin_write(conn)?;
    let head = require_session(&tx, attendance_id)?;

    let students: Vec<String> = match student_ids {
        None => roster::active_students_for_class(&tx, &head.class_id)?
            .into_iter()
            .map(|s| s.id)
            .collect(),
        Some(ids) => {
            if ids.is_empty() {
                return Err(ScheduleError::invalid("no students provided"));
            }
            for id in &ids {
                match roster::find_student(&tx, id)? {
                    Some(s) if s.class_id == head.class_id => {}
                    _ => {
                        return Err(ScheduleError::not_found(format!(
                            "student {} not found in class {}",
                            id, head.class_id
                        )))
                    }
                }
            }
            ids
        }
    };

    let mut existing: HashSet<String> = HashSet::new();
    {
        let mut stmt = tx.prepare("SELECT student_id FROM attendance_details WHERE attendance_id = ?")?;
        let rows = stmt.query_map([attendance_id], |r| r.get::<_, String>(0))?;
        for row in rows {
            existing.insert(row?);
        }
    }

    let fresh = missing_keys(students, &existing);
    let now = db::now_rfc3339();
    {
        let mut insert = tx.prepare(
            "INSERT INTO attendance_details(id, attendance_id, student_id, status, note, updated_at)
             VALUES(?, ?, ?, ?, NULL, ?)",
        )?;
        for student_id in &fresh {
            insert.execute(rusqlite::params![
                Uuid::new_v4().to_string(),
                attendance_id,
                student_id,
                default_status,
                now,
            ])?;
        }
    }
    tx.commit()?;

    info!(attendance_id, created = fresh.len(), status = default_status.as_str(), "attendance details created");
    Ok(fresh.len())
}

pub fn session_details(conn: &Connection, attendance_id: &str) -> Result<SessionDetails> {
    let head = require_session(conn, attendance_id)?;
    let mut stmt = conn.prepare(
        "SELECT d.id, d.student_id, COALESCE(s.full_name, ''), d.status, d.note
         FROM attendance_details d
         LEFT JOIN students s ON s.id = d.student_id
         WHERE d.attendance_id = ?
         ORDER BY s.full_name, d.student_id",
    )?;
    let details = stmt
        .query_map([attendance_id], |r| {
            Ok(DetailRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                status: r.get(3)?,
                note: r.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(SessionDetails {
        attendance_id: attendance_id.to_string(),
        date: head.date,
        approve: head.approve,
        details,
    })
}

/// Applies the marks and sets the approval flag in one transaction.
pub fn update_details(
    conn: &Connection,
    attendance_id: &str,
    updates: &[DetailUpdate],
    approve: bool,
) -> Result<SessionDetails> {
    if updates.is_empty() {
        return Err(ScheduleError::invalid("no updates provided"));
    }
    let tx = db::begin_write(conn)?;
    require_session(&tx, attendance_id)?;

    let now = db::now_rfc3339();
    for u in updates {
        let changed = tx.execute(
            "UPDATE attendance_details
             SET status = COALESCE(?, status), note = COALESCE(?, note), updated_at = ?
             WHERE attendance_id = ? AND student_id = ?",
            rusqlite::params![u.status, u.note, now, attendance_id, u.student_id],
        )?;
        if changed == 0 {
            return Err(ScheduleError::not_found(format!(
                "student {} has no attendance detail for {}",
                u.student_id, attendance_id
            )));
        }
    }
    tx.execute(
        "UPDATE attendances SET approve = ? WHERE id = ?",
        (approve as i64, attendance_id),
    )?;
    tx.commit()?;

    info!(attendance_id, updated = updates.len(), approve, "attendance details updated");
    session_details(conn, attendance_id)
}
