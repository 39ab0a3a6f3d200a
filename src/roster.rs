//! Read-only lookups into the roster tables the surrounding system owns.

use crate::error::{Result, ScheduleError};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct ClassRef {
    pub id: String,
    pub school_id: String,
    pub name: String,
}

/// A subject-teacher assignment resolved down to both school ids.
#[derive(Debug, Clone)]
pub struct AssignmentRef {
    pub id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub subject_school_id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub teacher_school_id: String,
}

impl AssignmentRef {
    /// Both the subject and the teacher must live in `school_id`.
    pub fn ensure_school(&self, school_id: &str) -> Result<()> {
        if self.subject_school_id == school_id && self.teacher_school_id == school_id {
            return Ok(());
        }
        Err(ScheduleError::conflict(
            "subject-teacher assignment must belong to the same school",
            json!({
                "subjectTeacherId": self.id,
                "schoolId": school_id,
                "subjectSchoolId": self.subject_school_id,
                "teacherSchoolId": self.teacher_school_id,
            }),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct StudentRef {
    pub id: String,
    pub class_id: String,
}

pub fn require_class(conn: &Connection, class_id: &str) -> Result<ClassRef> {
    conn.query_row(
        "SELECT id, school_id, name FROM classes WHERE id = ?",
        [class_id],
        |r| {
            Ok(ClassRef {
                id: r.get(0)?,
                school_id: r.get(1)?,
                name: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| ScheduleError::not_found(format!("class {} not found", class_id)))
}

/// Class lookup that also enforces school membership.
pub fn require_class_in_school(conn: &Connection, class_id: &str, school_id: &str) -> Result<ClassRef> {
    let class = require_class(conn, class_id)?;
    if class.school_id != school_id {
        return Err(ScheduleError::conflict(
            "class must belong to the same school",
            json!({
                "classId": class.id,
                "schoolId": school_id,
                "classSchoolId": class.school_id,
            }),
        ));
    }
    Ok(class)
}

pub fn require_assignment(conn: &Connection, assignment_id: &str) -> Result<AssignmentRef> {
    conn.query_row(
        "SELECT st.id, su.id, su.name, su.school_id, te.id, te.full_name, te.school_id
         FROM subject_teachers st
         JOIN subjects su ON su.id = st.subject_id
         JOIN teachers te ON te.id = st.teacher_id
         WHERE st.id = ?",
        [assignment_id],
        |r| {
            Ok(AssignmentRef {
                id: r.get(0)?,
                subject_id: r.get(1)?,
                subject_name: r.get(2)?,
                subject_school_id: r.get(3)?,
                teacher_id: r.get(4)?,
                teacher_name: r.get(5)?,
                teacher_school_id: r.get(6)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| {
        ScheduleError::not_found(format!("subject-teacher assignment {} not found", assignment_id))
    })
}

pub fn find_assignment(conn: &Connection, assignment_id: &str) -> Result<Option<AssignmentRef>> {
    match require_assignment(conn, assignment_id) {
        Ok(a) => Ok(Some(a)),
        Err(ScheduleError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn require_teacher_in_school(conn: &Connection, teacher_id: &str, school_id: &str) -> Result<()> {
    let found: Option<String> = conn
        .query_row(
            "SELECT school_id FROM teachers WHERE id = ?",
            [teacher_id],
            |r| r.get(0),
        )
        .optional()?;
    match found {
        None => Err(ScheduleError::not_found(format!("teacher {} not found", teacher_id))),
        Some(s) if s != school_id => Err(ScheduleError::not_found(format!(
            "teacher {} not found in school {}",
            teacher_id, school_id
        ))),
        Some(_) => Ok(()),
    }
}

pub fn class_ids_for_school(conn: &Connection, school_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM classes WHERE school_id = ? ORDER BY name, id")?;
    let ids = stmt
        .query_map([school_id], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn active_students_for_class(conn: &Connection, class_id: &str) -> Result<Vec<StudentRef>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id FROM students
         WHERE class_id = ? AND active = 1
         ORDER BY full_name, id",
    )?;
    let students = stmt
        .query_map([class_id], |r| {
            Ok(StudentRef {
                id: r.get(0)?,
                class_id: r.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(students)
}

pub fn find_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRef>> {
    let found = conn
        .query_row(
            "SELECT id, class_id FROM students WHERE id = ?",
            [student_id],
            |r| {
                Ok(StudentRef {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}
