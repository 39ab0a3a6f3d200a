//! Weekly timetable allocation: conflict-checked placement of recurring class
//! periods, teacher reassignment, and the default weekly grid.

use crate::db;
use crate::error::{Result, ScheduleError};
use crate::roster::{self, AssignmentRef};
use crate::schedule::{missing_keys, DayOfWeek, Interval, SchedulePolicy, WallTime};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub id: String,
    pub name: String,
    pub grade: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTeacherSummary {
    pub id: String,
    pub teacher_id: String,
    pub teacher_fullname: String,
    pub subject_id: String,
    pub subject_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub id: String,
    pub school_id: String,
    pub class_id: String,
    pub subject_teacher_id: Option<String>,
    pub day_of_week: DayOfWeek,
    pub start_time: WallTime,
    pub end_time: WallTime,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub class: ClassSummary,
    pub subject_teacher: Option<SubjectTeacherSummary>,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub school_id: String,
    pub class_id: String,
    pub subject_teacher_id: Option<String>,
    pub day_of_week: DayOfWeek,
    pub start_time: WallTime,
    pub end_time: WallTime,
    pub is_active: bool,
}

/// Fields left `None` keep their stored value. `subject_teacher_id:
/// Some(None)` clears the assignment.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub class_id: Option<String>,
    pub subject_teacher_id: Option<Option<String>>,
    pub day_of_week: Option<DayOfWeek>,
    pub start_time: Option<WallTime>,
    pub end_time: Option<WallTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridOutcome {
    pub created: usize,
    pub skipped: usize,
}

const ENTRY_SELECT: &str = "SELECT
       t.id, t.school_id, t.class_id, t.subject_teacher_id, t.day_of_week,
       t.start_time, t.end_time, t.is_active, t.created_at, t.updated_at,
       c.name, c.grade,
       st.teacher_id, te.full_name, st.subject_id, su.name
     FROM timetables t
     JOIN classes c ON c.id = t.class_id
     LEFT JOIN subject_teachers st ON st.id = t.subject_teacher_id
     LEFT JOIN teachers te ON te.id = st.teacher_id
     LEFT JOIN subjects su ON su.id = st.subject_id";

fn entry_from_row(r: &Row<'_>) -> rusqlite::Result<TimetableEntry> {
    let subject_teacher_id: Option<String> = r.get(3)?;
    let teacher_id: Option<String> = r.get(12)?;
    let subject_teacher = match (subject_teacher_id.clone(), teacher_id) {
        (Some(id), Some(teacher_id)) => Some(SubjectTeacherSummary {
            id,
            teacher_id,
            teacher_fullname: r.get::<_, Option<String>>(13)?.unwrap_or_default(),
            subject_id: r.get::<_, Option<String>>(14)?.unwrap_or_default(),
            subject_name: r.get::<_, Option<String>>(15)?.unwrap_or_default(),
        }),
        _ => None,
    };
    let class_id: String = r.get(2)?;
    Ok(TimetableEntry {
        id: r.get(0)?,
        school_id: r.get(1)?,
        class_id: class_id.clone(),
        subject_teacher_id,
        day_of_week: r.get(4)?,
        start_time: r.get(5)?,
        end_time: r.get(6)?,
        is_active: r.get::<_, i64>(7)? != 0,
        created_at: r.get(8)?,
        updated_at: r.get(9)?,
        class: ClassSummary {
            id: class_id,
            name: r.get(10)?,
            grade: r.get(11)?,
        },
        subject_teacher,
    })
}

fn sort_weekly(entries: &mut [TimetableEntry]) {
    entries.sort_by(|a, b| {
        (a.day_of_week, a.start_time, &a.class.name).cmp(&(b.day_of_week, b.start_time, &b.class.name))
    });
}

pub fn get_entry(conn: &Connection, id: &str) -> Result<TimetableEntry> {
    let sql = format!("{ENTRY_SELECT} WHERE t.id = ?");
    conn.query_row(&sql, [id], entry_from_row)
        .optional()?
        .ok_or_else(|| ScheduleError::not_found(format!("timetable {} not found", id)))
}

pub fn list_by_class(conn: &Connection, school_id: &str, class_id: &str) -> Result<Vec<TimetableEntry>> {
    debug!(school_id, class_id, "list timetables by class");
    let sql = format!("{ENTRY_SELECT} WHERE t.school_id = ? AND t.class_id = ?");
    let mut stmt = conn.prepare(&sql)?;
    let mut entries = stmt
        .query_map((school_id, class_id), entry_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    sort_weekly(&mut entries);
    Ok(entries)
}

pub fn list_by_teacher(conn: &Connection, school_id: &str, teacher_id: &str) -> Result<Vec<TimetableEntry>> {
    debug!(school_id, teacher_id, "list timetables by teacher");
    roster::require_teacher_in_school(conn, teacher_id, school_id)?;
    let sql = format!("{ENTRY_SELECT} WHERE t.school_id = ? AND st.teacher_id = ?");
    let mut stmt = conn.prepare(&sql)?;
    let mut entries = stmt
        .query_map((school_id, teacher_id), entry_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    sort_weekly(&mut entries);
    Ok(entries)
}

/// Minimal projection used by the overlap checks.
struct Slot {
    id: String,
    class_id: String,
    class_name: String,
    interval: Interval,
}

fn overlapping_slot(
    conn: &Connection,
    filter: &str,
    key: &str,
    day: DayOfWeek,
    interval: Interval,
    exclude_id: Option<&str>,
) -> Result<Option<Slot>> {
    let sql = format!(
        "SELECT t.id, t.class_id, c.name, t.start_time, t.end_time
         FROM timetables t
         JOIN classes c ON c.id = t.class_id
         LEFT JOIN subject_teachers st ON st.id = t.subject_teacher_id
         WHERE {filter} = ?1 AND t.day_of_week = ?2 AND (?3 IS NULL OR t.id <> ?3)
         ORDER BY t.start_time"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map((key, day, exclude_id), |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, WallTime>(3)?,
            r.get::<_, WallTime>(4)?,
        ))
    })?;
    for row in rows {
        let (id, class_id, class_name, start, end) = row?;
        let Some(existing) = Interval::new(start, end) else {
            continue;
        };
        if existing.overlaps(&interval) {
            return Ok(Some(Slot {
                id,
                class_id,
                class_name,
                interval: existing,
            }));
        }
    }
    Ok(None)
}

fn ensure_class_free(
    conn: &Connection,
    class_id: &str,
    day: DayOfWeek,
    interval: Interval,
    exclude_id: Option<&str>,
) -> Result<()> {
    let Some(slot) = overlapping_slot(conn, "t.class_id", class_id, day, interval, exclude_id)? else {
        return Ok(());
    };
    warn!(class_id, conflicting_entry = %slot.id, day = %day, "class slot conflict");
    Err(ScheduleError::conflict(
        format!(
            "class {} already has a session on {} from {} to {}",
            slot.class_name, day, slot.interval.start, slot.interval.end
        ),
        json!({
            "scope": "class",
            "conflictingTimetableId": slot.id,
            "classId": slot.class_id,
            "className": slot.class_name,
            "dayOfWeek": day,
            "startTime": slot.interval.start,
            "endTime": slot.interval.end,
        }),
    ))
}

/// The teacher behind `assignment` must not teach any other entry, in any
/// class, that overlaps `interval` on `day`.
fn ensure_teacher_free(
    conn: &Connection,
    assignment: &AssignmentRef,
    day: DayOfWeek,
    interval: Interval,
    exclude_id: Option<&str>,
) -> Result<()> {
    let Some(slot) = overlapping_slot(
        conn,
        "st.teacher_id",
        &assignment.teacher_id,
        day,
        interval,
        exclude_id,
    )?
    else {
        return Ok(());
    };
    warn!(teacher_id = %assignment.teacher_id, conflicting_entry = %slot.id, day = %day, "teacher slot conflict");
    Err(ScheduleError::conflict(
        format!(
            "teacher {} already teaches class {} on {} from {} to {}",
            assignment.teacher_name, slot.class_name, day, slot.interval.start, slot.interval.end
        ),
        json!({
            "scope": "teacher",
            "conflictingTimetableId": slot.id,
            "teacherId": assignment.teacher_id,
            "teacherFullname": assignment.teacher_name,
            "classId": slot.class_id,
            "className": slot.class_name,
            "dayOfWeek": day,
            "startTime": slot.interval.start,
            "endTime": slot.interval.end,
        }),
    ))
}

fn require_interval(start: WallTime, end: WallTime) -> Result<Interval> {
    Interval::new(start, end).ok_or_else(|| {
        ScheduleError::invalid(format!("endTime {} must be after startTime {}", end, start))
    })
}

pub fn create_entry(conn: &Connection, new: NewEntry) -> Result<TimetableEntry> {
    info!(school_id = %new.school_id, class_id = %new.class_id, day = %new.day_of_week, "create timetable");
    let interval = require_interval(new.start_time, new.end_time)?;

    let tx = db::begin_write(conn)?;
    let class = roster::require_class_in_school(&tx, &new.class_id, &new.school_id)?;
    let assignment = match new.subject_teacher_id.as_deref() {
        Some(aid) => {
            let a = roster::require_assignment(&tx, aid)?;
            a.ensure_school(&new.school_id)?;
            Some(a)
        }
        None => None,
    };

    ensure_class_free(&tx, &class.id, new.day_of_week, interval, None)?;
    if let Some(a) = &assignment {
        ensure_teacher_free(&tx, a, new.day_of_week, interval, None)?;
    }

    let id = Uuid::new_v4().to_string();
    let now = db::now_rfc3339();
    tx.execute(
        "INSERT INTO timetables(
           id, school_id, class_id, subject_teacher_id, day_of_week,
           start_time, end_time, is_active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            new.school_id,
            class.id,
            new.subject_teacher_id,
            new.day_of_week,
            new.start_time,
            new.end_time,
            new.is_active as i64,
            now,
            now,
        ],
    )
    .map_err(|e| {
        ScheduleError::from_write(
            e,
            "class already has a session at that time",
            json!({ "scope": "class", "classId": class.id, "dayOfWeek": new.day_of_week }),
        )
    })?;
    tx.commit()?;

    info!(entry_id = %id, class = %class.name, "timetable created");
    get_entry(conn, &id)
}

pub fn update_entry(conn: &Connection, id: &str, patch: EntryPatch) -> Result<TimetableEntry> {
    info!(entry_id = id, ?patch, "update timetable");
    let tx = db::begin_write(conn)?;
    let existing = get_entry(&tx, id)?;

    let class_id = match patch.class_id {
        Some(cid) if cid != existing.class_id => {
            roster::require_class_in_school(&tx, &cid, &existing.school_id)?.id
        }
        _ => existing.class_id.clone(),
    };
    let day = patch.day_of_week.unwrap_or(existing.day_of_week);
    let start = patch.start_time.unwrap_or(existing.start_time);
    let end = patch.end_time.unwrap_or(existing.end_time);
    let interval = require_interval(start, end)?;
    let subject_teacher_id = match patch.subject_teacher_id {
        Some(v) => v,
        None => existing.subject_teacher_id.clone(),
    };
    let is_active = patch.is_active.unwrap_or(existing.is_active);

    let assignment_changed = subject_teacher_id != existing.subject_teacher_id;
    let slot_changed = class_id != existing.class_id
        || day != existing.day_of_week
        || start != existing.start_time
        || end != existing.end_time;

    ensure_class_free(&tx, &class_id, day, interval, Some(id))?;
    if let Some(aid) = subject_teacher_id.as_deref() {
        if assignment_changed || slot_changed {
            let a = roster::require_assignment(&tx, aid)?;
            if assignment_changed {
                a.ensure_school(&existing.school_id)?;
            }
            ensure_teacher_free(&tx, &a, day, interval, Some(id))?;
        }
    }

    tx.execute(
        "UPDATE timetables
         SET class_id = ?, subject_teacher_id = ?, day_of_week = ?, start_time = ?,
             end_time = ?, is_active = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            class_id,
            subject_teacher_id,
            day,
            start,
            end,
            is_active as i64,
            db::now_rfc3339(),
            id,
        ],
    )
    .map_err(|e| {
        ScheduleError::from_write(
            e,
            "class already has a session at that time",
            json!({ "scope": "class", "classId": class_id, "dayOfWeek": day }),
        )
    })?;
    tx.commit()?;

    get_entry(conn, id)
}

/// Binds a (new) subject-teacher assignment to an entry whose class, day
/// and time stay as they are.
pub fn reassign_teacher(
    conn: &Connection,
    id: &str,
    subject_teacher_id: &str,
    is_active: Option<bool>,
) -> Result<TimetableEntry> {
    info!(entry_id = id, subject_teacher_id, "reassign timetable teacher");
    let tx = db::begin_write(conn)?;
    let existing = get_entry(&tx, id)?;
    let assignment = roster::require_assignment(&tx, subject_teacher_id)?;
    assignment.ensure_school(&existing.school_id)?;

    let interval = require_interval(existing.start_time, existing.end_time)?;
    ensure_teacher_free(&tx, &assignment, existing.day_of_week, interval, Some(id))?;

    tx.execute(
        "UPDATE timetables SET subject_teacher_id = ?, is_active = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![
            assignment.id,
            is_active.unwrap_or(existing.is_active) as i64,
            db::now_rfc3339(),
            id,
        ],
    )?;
    tx.commit()?;

    info!(entry_id = id, teacher_id = %assignment.teacher_id, subject_id = %assignment.subject_id, "teacher assigned");
    get_entry(conn, id)
}

type GridKey = (String, DayOfWeek, WallTime, WallTime);

/// Seeds one unassigned, active entry per (class, day, window). Slots that
/// already exist, or that would overlap an existing entry of the class, are
/// skipped, so repeated calls converge on the same grid.
pub fn generate_weekly_grid(conn: &Connection, policy: &SchedulePolicy, school_id: &str) -> Result<GridOutcome> {
    info!(school_id, "generate weekly timetable grid");
    let tx = db::begin_write(conn)?;
    let class_ids = roster::class_ids_for_school(&tx, school_id)?;
    if class_ids.is_empty() {
        return Err(ScheduleError::not_found(format!(
            "no classes found for school {}",
            school_id
        )));
    }

    let mut existing: HashSet<GridKey> = HashSet::new();
    let mut occupied: HashMap<(String, DayOfWeek), Vec<Interval>> = HashMap::new();
    {
        let mut stmt = tx.prepare(
            "SELECT t.class_id, t.day_of_week, t.start_time, t.end_time
             FROM timetables t
             JOIN classes c ON c.id = t.class_id
             WHERE c.school_id = ?",
        )?;
        let rows = stmt.query_map([school_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, DayOfWeek>(1)?,
                r.get::<_, WallTime>(2)?,
                r.get::<_, WallTime>(3)?,
            ))
        })?;
        for row in rows {
            let (class_id, day, start, end) = row?;
            if let Some(iv) = Interval::new(start, end) {
                occupied.entry((class_id.clone(), day)).or_default().push(iv);
            }
            existing.insert((class_id, day, start, end));
        }
    }

    let mut proposed: Vec<GridKey> = Vec::new();
    for class_id in &class_ids {
        for day in DayOfWeek::ALL {
            for w in policy.windows_for(day) {
                proposed.push((class_id.clone(), day, w.start, w.end));
            }
        }
    }
    let total = proposed.len();
    let fresh = missing_keys(proposed, &existing);

    let now = db::now_rfc3339();
    let mut created = 0usize;
    {
        let mut insert = tx.prepare(
            "INSERT INTO timetables(
               id, school_id, class_id, subject_teacher_id, day_of_week,
               start_time, end_time, is_active, created_at, updated_at)
             VALUES(?, ?, ?, NULL, ?, ?, ?, 1, ?, ?)",
        )?;
        for (class_id, day, start, end) in fresh {
            let Some(iv) = Interval::new(start, end) else {
                continue;
            };
            let taken = occupied.entry((class_id.clone(), day)).or_default();
            if taken.iter().any(|other| other.overlaps(&iv)) {
                continue;
            }
            insert.execute(rusqlite::params![
                Uuid::new_v4().to_string(),
                school_id,
                class_id,
                day,
                start,
                end,
                now,
                now,
            ])?;
            taken.push(iv);
            created += 1;
        }
    }
    tx.commit()?;

    let outcome = GridOutcome {
        created,
        skipped: total - created,
    };
    info!(school_id, classes = class_ids.len(), created = outcome.created, skipped = outcome.skipped, "weekly grid generated");
    Ok(outcome)
}

pub fn delete_entry(conn: &Connection, id: &str) -> Result<()> {
    info!(entry_id = id, "delete timetable");
    let tx = db::begin_write(conn)?;
    let exists: Option<i64> = tx
        .query_row("SELECT 1 FROM timetables WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(ScheduleError::not_found(format!("timetable {} not found", id)));
    }
    let sessions: i64 = tx.query_row(
        "SELECT COUNT(*) FROM attendances WHERE timetable_id = ?",
        [id],
        |r| r.get(0),
    )?;
    if sessions > 0 {
        return Err(ScheduleError::conflict(
            "timetable still has attendance sessions; delete them first",
            json!({ "timetableId": id, "attendanceCount": sessions }),
        ));
    }
    tx.execute("DELETE FROM timetables WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(())
}
