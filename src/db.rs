use crate::calc::AttendanceTally;
use crate::model::{
    AttendanceRecord, AttendanceStatus, DateRange, Exam, MarkRecord, Student, Subject,
};
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "schoold.sqlite3";
const DATE_FMT: &str = "%Y-%m-%d";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT '',
            class_teacher_id TEXT,
            created_at TEXT
        )",
        [],
    )?;

    // class_id is nullable: a student may exist before being placed in a class.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            class_id TEXT,
            created_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_roll ON students(roll_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_class ON subjects(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            max_marks INTEGER NOT NULL CHECK(max_marks > 0),
            grade_scale TEXT,
            created_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_class ON exams(class_id)",
        [],
    )?;

    // One mark per (exam, student, subject); resubmission overwrites.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            marks_scored REAL NOT NULL,
            updated_at TEXT,
            UNIQUE(exam_id, student_id, subject_id),
            FOREIGN KEY(exam_id) REFERENCES exams(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(subject_id) REFERENCES subjects(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_exam ON marks(exam_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_exam_student ON marks(exam_id, student_id)",
        [],
    )?;

    // One record per (student, date).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('Present', 'Absent')),
            updated_at TEXT,
            UNIQUE(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_date ON attendance(class_id, date)",
        [],
    )?;

    tracing::debug!(path = %db_path.display(), "workspace database ready");
    Ok(conn)
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FMT)
        .with_context(|| format!("date must be YYYY-MM-DD, got {:?}", raw))
}

fn range_bounds(range: &DateRange) -> (Option<String>, Option<String>) {
    (range.start.map(format_date), range.end.map(format_date))
}

fn attendance_from_parts(
    student_id: String,
    date: String,
    status: String,
) -> anyhow::Result<AttendanceRecord> {
    let status = status
        .parse::<AttendanceStatus>()
        .map_err(|e| anyhow!(e))?;
    Ok(AttendanceRecord {
        student_id,
        date: parse_date(&date)?,
        status,
    })
}

// ---- classes -------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub section: String,
    pub class_teacher_id: Option<String>,
    pub student_count: i64,
}

pub fn insert_class(
    conn: &Connection,
    name: &str,
    section: &str,
    class_teacher_id: Option<&str>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, section, class_teacher_id, created_at) VALUES(?, ?, ?, ?, ?)",
        (&id, name, section, class_teacher_id, now_stamp()),
    )?;
    Ok(id)
}

pub fn class_exists(conn: &Connection, class_id: &str) -> anyhow::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

pub fn list_classes(conn: &Connection) -> anyhow::Result<Vec<ClassRow>> {
    // Correlated subquery avoids double-counting from joins.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.section,
           c.class_teacher_id,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
         FROM classes c
         ORDER BY c.name, c.section",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                section: r.get(2)?,
                class_teacher_id: r.get(3)?,
                student_count: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- students ------------------------------------------------------------

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        full_name: r.get(1)?,
        roll_no: r.get(2)?,
        class_id: r.get(3)?,
    })
}

pub fn insert_student(
    conn: &Connection,
    full_name: &str,
    roll_no: &str,
    class_id: Option<&str>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, full_name, roll_no, class_id, created_at) VALUES(?, ?, ?, ?, ?)",
        (&id, full_name, roll_no, class_id, now_stamp()),
    )?;
    Ok(id)
}

pub fn get_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    Ok(conn
        .query_row(
            "SELECT id, full_name, roll_no, class_id FROM students WHERE id = ?",
            [student_id],
            student_from_row,
        )
        .optional()?)
}

/// Class roster ordered by roll number (compared as text), then id.
pub fn list_students_for_class(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, roll_no, class_id
         FROM students
         WHERE class_id = ?
         ORDER BY roll_no, id",
    )?;
    let rows = stmt
        .query_map([class_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_unassigned_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, roll_no, class_id
         FROM students
         WHERE class_id IS NULL
         ORDER BY roll_no, id",
    )?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Moves the given students into `class_id`. Returns how many rows changed.
pub fn assign_students(
    conn: &Connection,
    class_id: &str,
    student_ids: &[String],
) -> anyhow::Result<usize> {
    if student_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = std::iter::repeat("?")
        .take(student_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "UPDATE students SET class_id = ? WHERE id IN ({})",
        placeholders
    );
    let mut bind_values: Vec<Value> = Vec::with_capacity(student_ids.len() + 1);
    bind_values.push(Value::Text(class_id.to_string()));
    for id in student_ids {
        bind_values.push(Value::Text(id.clone()));
    }
    Ok(conn.execute(&sql, params_from_iter(bind_values))?)
}

// ---- subjects & exams ----------------------------------------------------

pub fn insert_subject(conn: &Connection, name: &str, class_id: &str) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name, class_id) VALUES(?, ?, ?)",
        (&id, name, class_id),
    )?;
    Ok(id)
}

pub fn list_subjects(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<Subject>> {
    let mut stmt =
        conn.prepare("SELECT id, name, class_id FROM subjects WHERE class_id = ? ORDER BY name, id")?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                class_id: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn exam_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Exam> {
    Ok(Exam {
        id: r.get(0)?,
        name: r.get(1)?,
        class_id: r.get(2)?,
        max_marks: r.get(3)?,
        grade_scale: r.get(4)?,
    })
}

pub fn insert_exam(
    conn: &Connection,
    name: &str,
    class_id: &str,
    max_marks: i64,
    grade_scale: Option<&str>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, name, class_id, max_marks, grade_scale, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, name, class_id, max_marks, grade_scale, now_stamp()),
    )?;
    Ok(id)
}

pub fn get_exam(conn: &Connection, exam_id: &str) -> anyhow::Result<Option<Exam>> {
    Ok(conn
        .query_row(
            "SELECT id, name, class_id, max_marks, grade_scale FROM exams WHERE id = ?",
            [exam_id],
            exam_from_row,
        )
        .optional()?)
}

pub fn list_exams(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<Exam>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, class_id, max_marks, grade_scale
         FROM exams
         WHERE class_id = ?
         ORDER BY created_at, name",
    )?;
    let rows = stmt
        .query_map([class_id], exam_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- marks ---------------------------------------------------------------

pub fn upsert_mark(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
    subject_id: &str,
    marks_scored: f64,
) -> anyhow::Result<()> {
    let mark_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO marks(id, exam_id, student_id, subject_id, marks_scored, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(exam_id, student_id, subject_id) DO UPDATE SET
           marks_scored = excluded.marks_scored,
           updated_at = excluded.updated_at",
        (&mark_id, exam_id, student_id, subject_id, marks_scored, now_stamp()),
    )?;
    Ok(())
}

/// All mark records for an exam. Row order (roll number, student id, subject
/// name) is the "first appearance" order the rank list uses for ties.
pub fn fetch_mark_records(conn: &Connection, exam_id: &str) -> anyhow::Result<Vec<MarkRecord>> {
    let mut stmt = conn.prepare(
        "SELECT m.exam_id, m.student_id, m.subject_id, m.marks_scored
         FROM marks m
         JOIN students s ON s.id = m.student_id
         JOIN subjects sub ON sub.id = m.subject_id
         WHERE m.exam_id = ?
         ORDER BY s.roll_no, s.id, sub.name, sub.id",
    )?;
    let rows = stmt
        .query_map([exam_id], |r| {
            Ok(MarkRecord {
                exam_id: r.get(0)?,
                student_id: r.get(1)?,
                subject_id: r.get(2)?,
                marks_scored: r.get(3)?,
                max_marks: None,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMark {
    pub subject_id: String,
    pub subject_name: String,
    pub marks_scored: f64,
    pub max_marks: i64,
}

pub fn fetch_student_exam_marks(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
) -> anyhow::Result<Vec<SubjectMark>> {
    let mut stmt = conn.prepare(
        "SELECT sub.id, sub.name, m.marks_scored, e.max_marks
         FROM marks m
         JOIN subjects sub ON sub.id = m.subject_id
         JOIN exams e ON e.id = m.exam_id
         WHERE m.exam_id = ? AND m.student_id = ?
         ORDER BY sub.name, sub.id",
    )?;
    let rows = stmt
        .query_map((exam_id, student_id), |r| {
            Ok(SubjectMark {
                subject_id: r.get(0)?,
                subject_name: r.get(1)?,
                marks_scored: r.get(2)?,
                max_marks: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- attendance ----------------------------------------------------------

pub fn upsert_attendance(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    date: NaiveDate,
    status: AttendanceStatus,
) -> anyhow::Result<()> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attendance(id, student_id, class_id, date, status, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET
           class_id = excluded.class_id,
           status = excluded.status,
           updated_at = excluded.updated_at",
        (
            &id,
            student_id,
            class_id,
            format_date(date),
            status.as_str(),
            now_stamp(),
        ),
    )?;
    Ok(())
}

pub fn fetch_attendance_for_class_date(
    conn: &Connection,
    class_id: &str,
    date: NaiveDate,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT a.student_id, a.date, a.status
         FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE a.class_id = ? AND a.date = ?
         ORDER BY s.roll_no, s.id",
    )?;
    let rows = stmt
        .query_map((class_id, format_date(date)), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(student_id, date, status)| attendance_from_parts(student_id, date, status))
        .collect()
}

/// One student's records inside `range`, oldest first.
pub fn fetch_attendance_records(
    conn: &Connection,
    student_id: &str,
    range: &DateRange,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let (start, end) = range_bounds(range);
    let mut stmt = conn.prepare(
        "SELECT student_id, date, status
         FROM attendance
         WHERE student_id = ?1
           AND (?2 IS NULL OR date >= ?2)
           AND (?3 IS NULL OR date <= ?3)
         ORDER BY date",
    )?;
    let rows = stmt
        .query_map((student_id, start, end), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(student_id, date, status)| attendance_from_parts(student_id, date, status))
        .collect()
}

/// Raw per-student counts for a class roster inside `range`. Students without
/// any record come back with zero counts.
pub fn attendance_tallies(
    conn: &Connection,
    class_id: &str,
    range: &DateRange,
) -> anyhow::Result<Vec<(String, AttendanceTally)>> {
    let (start, end) = range_bounds(range);
    let mut stmt = conn.prepare(
        "SELECT
           s.id,
           COUNT(a.id),
           COALESCE(SUM(CASE WHEN a.status = 'Present' THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN a.status = 'Absent' THEN 1 ELSE 0 END), 0)
         FROM students s
         LEFT JOIN attendance a
           ON a.student_id = s.id
          AND (?2 IS NULL OR a.date >= ?2)
          AND (?3 IS NULL OR a.date <= ?3)
         WHERE s.class_id = ?1
         GROUP BY s.id
         ORDER BY s.roll_no, s.id",
    )?;
    let rows = stmt
        .query_map((class_id, start, end), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, i64>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(student_id, total, present, absent)| -> anyhow::Result<(String, AttendanceTally)> {
            let count = |v: i64| {
                u32::try_from(v).with_context(|| format!("attendance count out of range: {}", v))
            };
            Ok((
                student_id,
                AttendanceTally {
                    total: count(total)?,
                    present: count(present)?,
                    absent: count(absent)?,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_date(s).expect("date")
    }

    #[test]
    fn marks_and_attendance_upserts_never_duplicate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        let class_id = insert_class(&conn, "Grade 8", "B", None).expect("class");
        let student = insert_student(&conn, "Ana Ruiz", "04", Some(&class_id)).expect("student");
        let subject = insert_subject(&conn, "Math", &class_id).expect("subject");
        let exam = insert_exam(&conn, "Midterm", &class_id, 100, None).expect("exam");

        upsert_mark(&conn, &exam, &student, &subject, 40.0).expect("mark");
        upsert_mark(&conn, &exam, &student, &subject, 72.5).expect("mark again");
        let marks = fetch_mark_records(&conn, &exam).expect("fetch marks");
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].marks_scored, 72.5);

        let d = day("2025-02-03");
        upsert_attendance(&conn, &class_id, &student, d, AttendanceStatus::Absent)
            .expect("attendance");
        upsert_attendance(&conn, &class_id, &student, d, AttendanceStatus::Present)
            .expect("attendance again");
        let records =
            fetch_attendance_records(&conn, &student, &DateRange::default()).expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Present);
    }

    #[test]
    fn tallies_include_students_without_records_and_respect_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        let class_id = insert_class(&conn, "Grade 9", "A", None).expect("class");
        let a = insert_student(&conn, "A", "01", Some(&class_id)).expect("student");
        let _b = insert_student(&conn, "B", "02", Some(&class_id)).expect("student");
        for (d, status) in [
            ("2025-01-05", AttendanceStatus::Present),
            ("2025-01-06", AttendanceStatus::Absent),
            ("2025-02-01", AttendanceStatus::Present),
        ] {
            upsert_attendance(&conn, &class_id, &a, day(d), status).expect("attendance");
        }

        let january = DateRange {
            start: Some(day("2025-01-01")),
            end: Some(day("2025-01-31")),
        };
        let tallies = attendance_tallies(&conn, &class_id, &january).expect("tallies");
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].0, a);
        assert_eq!(
            tallies[0].1,
            AttendanceTally {
                total: 2,
                present: 1,
                absent: 1
            }
        );
        assert_eq!(tallies[1].1, AttendanceTally::default());
    }

    #[test]
    fn exam_max_marks_must_be_positive_in_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        let class_id = insert_class(&conn, "Grade 7", "C", None).expect("class");
        assert!(insert_exam(&conn, "Broken", &class_id, 0, None).is_err());
    }
}
