use crate::calc::{compute_attendance_summary, summarize_tally, StudentAttendance};
use crate::db;
use crate::ipc::helpers::{
    db_insert, db_query, db_tx, get_date_range, get_required_date, get_required_str, require_principal,
    require_teacher, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{AttendanceSubmission, SessionError};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;

fn ensure_class(conn: &Connection, class_id: &str) -> Result<(), HandlerErr> {
    if db::class_exists(conn, class_id).map_err(db_query)? {
        Ok(())
    } else {
        Err(HandlerErr::not_found("class not found"))
    }
}

fn attendance_mark(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let principal = require_teacher(params)?;
    let submission: AttendanceSubmission = serde_json::from_value(params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid submission: {}", e)))?;
    if submission.records.is_empty() {
        return Err(SessionError::EmptySubmission.into());
    }
    ensure_class(conn, &submission.class_id)?;

    let roster: HashSet<String> = db::list_students_for_class(conn, &submission.class_id)
        .map_err(db_query)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    if let Some(stray) = submission
        .records
        .iter()
        .find(|r| !roster.contains(&r.student_id))
    {
        return Err(SessionError::UnknownStudent(stray.student_id.clone()).into());
    }

    let tx = conn.unchecked_transaction().map_err(db_tx)?;
    for r in &submission.records {
        db::upsert_attendance(
            &tx,
            &submission.class_id,
            &r.student_id,
            submission.date,
            r.status,
        )
        .map_err(db_insert)?;
    }
    tx.commit().map_err(db_tx)?;

    tracing::info!(
        class_id = %submission.class_id,
        date = %submission.date,
        count = submission.records.len(),
        by = %principal.id,
        "attendance saved"
    );
    Ok(json!({
        "classId": submission.class_id,
        "date": db::format_date(submission.date),
        "saved": submission.records.len()
    }))
}

fn attendance_class_date(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_teacher(params)?;
    let class_id = get_required_str(params, "classId")?;
    let date = get_required_date(params, "date")?;
    ensure_class(conn, &class_id)?;

    let students = db::list_students_for_class(conn, &class_id).map_err(db_query)?;
    let records = db::fetch_attendance_for_class_date(conn, &class_id, date).map_err(db_query)?;
    Ok(json!({
        "classId": class_id,
        "date": db::format_date(date),
        "students": students,
        "records": records
    }))
}

fn attendance_student_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let principal = require_principal(params)?;
    let student_id = get_required_str(params, "studentId")?;
    if !principal.can_view_student(&student_id) {
        return Err(HandlerErr::forbidden("cannot view another student's attendance"));
    }
    let range = get_date_range(params)?;
    if db::get_student(conn, &student_id)
        .map_err(db_query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("student not found"));
    }

    let records = db::fetch_attendance_records(conn, &student_id, &range).map_err(db_query)?;
    let summary = compute_attendance_summary(&records)?;
    Ok(json!({
        "studentId": student_id,
        "records": records,
        "summary": summary
    }))
}

fn attendance_class_statistics(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_teacher(params)?;
    let class_id = get_required_str(params, "classId")?;
    let range = get_date_range(params)?;
    ensure_class(conn, &class_id)?;

    let students = db::list_students_for_class(conn, &class_id).map_err(db_query)?;
    let tallies = db::attendance_tallies(conn, &class_id, &range).map_err(db_query)?;
    let mut rows = Vec::with_capacity(tallies.len());
    for (student_id, tally) in tallies {
        let summary = summarize_tally(tally)?;
        let student = students.iter().find(|s| s.id == student_id);
        rows.push(json!({
            "studentName": student.map(|s| s.full_name.as_str()).unwrap_or_default(),
            "rollNo": student.map(|s| s.roll_no.as_str()).unwrap_or_default(),
            "attendance": StudentAttendance { student_id, summary },
        }));
    }
    Ok(json!({ "classId": class_id, "students": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(with_conn(state, req, attendance_mark)),
        "attendance.classDate" => Some(with_conn(state, req, attendance_class_date)),
        "attendance.studentSummary" => Some(with_conn(state, req, attendance_student_summary)),
        "attendance.classStatistics" => Some(with_conn(state, req, attendance_class_statistics)),
        _ => None,
    }
}
