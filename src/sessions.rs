//! Expansion of a weekly timetable into dated attendance sessions for one
//! semester, plus the symmetric bulk delete and the ordered listing.

use crate::db;
use crate::error::{Result, ScheduleError};
use crate::roster;
use crate::schedule::{missing_keys, occurrences, DateRange, DayOfWeek, SchedulePolicy, Semester, WallTime};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandOutcome {
    pub created: usize,
    pub range: DateRange,
    pub semester: Semester,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimetable {
    pub id: String,
    pub day_of_week: DayOfWeek,
    pub start_time: WallTime,
    pub end_time: WallTime,
    pub class_id: String,
    pub subject_teacher_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSession {
    pub id: String,
    pub date: NaiveDate,
    pub semester: Semester,
    pub approve: bool,
    pub timetable: SessionTimetable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListing {
    pub count: usize,
    pub class_id: String,
    pub subject_teacher_id: String,
    pub teacher_name: String,
    pub subject_name: String,
    pub semester: Semester,
    pub sessions: Vec<AttendanceSession>,
}

struct PairEntry {
    id: String,
    school_id: String,
    day: DayOfWeek,
}

/// Timetable entries for one (class, assignment) pair; empty is NotFound.
fn entries_for_pair(conn: &Connection, class_id: &str, assignment_id: &str) -> Result<Vec<PairEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, school_id, day_of_week FROM timetables
         WHERE class_id = ? AND subject_teacher_id = ?",
    )?;
    let entries = stmt
        .query_map((class_id, assignment_id), |r| {
            Ok(PairEntry {
                id: r.get(0)?,
                school_id: r.get(1)?,
                day: r.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if entries.is_empty() {
        return Err(ScheduleError::not_found(format!(
            "class {} has no timetable for subject-teacher assignment {}",
            class_id, assignment_id
        )));
    }
    Ok(entries)
}

pub fn expand_sessions(
    conn: &Connection,
    policy: &SchedulePolicy,
    class_id: &str,
    assignment_id: &str,
    semester: Semester,
    year: i32,
) -> Result<ExpandOutcome> {
    info!(class_id, assignment_id, %semester, year, "expand attendance sessions");
    let range = policy.semester_range(semester, year).ok_or_else(|| {
        ScheduleError::invalid(format!("{} has no valid date range in {}", semester, year))
    })?;

    let tx = db::begin_write(conn)?;
    let entries = entries_for_pair(&tx, class_id, assignment_id)?;

    let slots: Vec<(usize, DayOfWeek)> = entries.iter().enumerate().map(|(i, e)| (i, e.day)).collect();
    let proposed: Vec<(String, NaiveDate)> = occurrences(&slots, range)
        .into_iter()
        .map(|(i, date)| (entries[i].id.clone(), date))
        .collect();

    let mut existing: HashSet<(String, NaiveDate)> = HashSet::new();
    {
        let mut stmt = tx.prepare(
            "SELECT timetable_id, date FROM attendances
             WHERE timetable_id IN (
               SELECT id FROM timetables WHERE class_id = ?1 AND subject_teacher_id = ?2
             )
             AND date BETWEEN ?3 AND ?4",
        )?;
        let rows = stmt.query_map((class_id, assignment_id, range.start, range.end), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, NaiveDate>(1)?))
        })?;
        for row in rows {
            existing.insert(row?);
        }
    }

    let proposed_count = proposed.len();
    let fresh = missing_keys(proposed, &existing);
    let now = db::now_rfc3339();
    {
        let mut insert = tx.prepare(
            "INSERT INTO attendances(id, school_id, timetable_id, date, semester, approve, created_at)
             VALUES(?, ?, ?, ?, ?, 0, ?)",
        )?;
        for (timetable_id, date) in &fresh {
            let school_id = entries
                .iter()
                .find(|e| &e.id == timetable_id)
                .map(|e| e.school_id.as_str())
                .unwrap_or_default();
            insert.execute(rusqlite::params![
                Uuid::new_v4().to_string(),
                school_id,
                timetable_id,
                date,
                semester,
                now,
            ])?;
        }
    }
    tx.commit()?;

    info!(
        class_id,
        assignment_id,
        proposed = proposed_count,
        created = fresh.len(),
        start = %range.start,
        end = %range.end,
        "attendance sessions expanded"
    );
    Ok(ExpandOutcome {
        created: fresh.len(),
        range,
        semester,
    })
}

/// Removes every session of the pair carrying `semester`, whatever its date.
pub fn delete_sessions(
    conn: &Connection,
    class_id: &str,
    assignment_id: &str,
    semester: Semester,
) -> Result<usize> {
    info!(class_id, assignment_id, %semester, "delete attendance sessions");
    let tx = db::begin_write(conn)?;
    entries_for_pair(&tx, class_id, assignment_id)?;

    tx.execute(
        "DELETE FROM attendance_details WHERE attendance_id IN (
           SELECT a.id FROM attendances a
           JOIN timetables t ON t.id = a.timetable_id
           WHERE t.class_id = ?1 AND t.subject_teacher_id = ?2 AND a.semester = ?3
         )",
        (class_id, assignment_id, semester),
    )?;
    let deleted = tx.execute(
        "DELETE FROM attendances WHERE semester = ?3 AND timetable_id IN (
           SELECT id FROM timetables WHERE class_id = ?1 AND subject_teacher_id = ?2
         )",
        (class_id, assignment_id, semester),
    )?;
    tx.commit()?;

    info!(class_id, assignment_id, deleted, "attendance sessions deleted");
    Ok(deleted)
}

pub fn list_sessions(
    conn: &Connection,
    class_id: &str,
    assignment_id: &str,
    semester: Semester,
) -> Result<SessionListing> {
    debug!(class_id, assignment_id, %semester, "list attendance sessions");
    entries_for_pair(conn, class_id, assignment_id)?;
    let assignment = roster::find_assignment(conn, assignment_id)?;

    let mut stmt = conn.prepare(
        "SELECT a.id, a.date, a.semester, a.approve,
                t.id, t.day_of_week, t.start_time, t.end_time, t.class_id, t.subject_teacher_id
         FROM attendances a
         JOIN timetables t ON t.id = a.timetable_id
         WHERE t.class_id = ?1 AND t.subject_teacher_id = ?2 AND a.semester = ?3
         ORDER BY a.date ASC, t.start_time ASC",
    )?;
    let sessions = stmt
        .query_map((class_id, assignment_id, semester), |r| {
            Ok(AttendanceSession {
                id: r.get(0)?,
                date: r.get(1)?,
                semester: r.get(2)?,
                approve: r.get::<_, i64>(3)? != 0,
                timetable: SessionTimetable {
                    id: r.get(4)?,
                    day_of_week: r.get(5)?,
                    start_time: r.get(6)?,
                    end_time: r.get(7)?,
                    class_id: r.get(8)?,
                    subject_teacher_id: r.get(9)?,
                },
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(SessionListing {
        count: sessions.len(),
        class_id: class_id.to_string(),
        subject_teacher_id: assignment_id.to_string(),
        teacher_name: assignment.as_ref().map(|a| a.teacher_name.clone()).unwrap_or_default(),
        subject_name: assignment.map(|a| a.subject_name).unwrap_or_default(),
        semester,
        sessions,
    })
}
