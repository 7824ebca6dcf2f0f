use crate::db;
use crate::error::CalcError;
use crate::ipc::helpers::{
    db_insert, db_query, get_optional_str, get_required_str, require_principal,
    require_teacher, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn ensure_class(conn: &Connection, class_id: &str) -> Result<(), HandlerErr> {
    if db::class_exists(conn, class_id).map_err(db_query)? {
        Ok(())
    } else {
        Err(HandlerErr::not_found("class not found"))
    }
}

fn subjects_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_teacher(params)?;
    let name = get_required_str(params, "name")?;
    let class_id = get_required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;
    let subject_id = db::insert_subject(conn, &name, &class_id).map_err(db_insert)?;
    Ok(json!({ "subjectId": subject_id, "name": name, "classId": class_id }))
}

fn subjects_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_principal(params)?;
    let class_id = get_required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;
    let subjects = db::list_subjects(conn, &class_id).map_err(db_query)?;
    Ok(json!({ "subjects": subjects }))
}

fn parse_max_marks(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let Some(raw) = params.get("maxMarks").filter(|v| !v.is_null()) else {
        return Err(HandlerErr::bad_params("missing maxMarks"));
    };
    let value = raw.as_f64().unwrap_or(f64::NAN);
    match raw.as_i64() {
        Some(n) if n > 0 => Ok(n),
        _ => Err(CalcError::InvalidMaxMarks { value }.into()),
    }
}

fn exams_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let principal = require_teacher(params)?;
    let name = get_required_str(params, "name")?;
    let class_id = get_required_str(params, "classId")?;
    let max_marks = parse_max_marks(params)?;
    let grade_scale = get_optional_str(params, "gradeScale")?;
    ensure_class(conn, &class_id)?;

    let exam_id = db::insert_exam(conn, &name, &class_id, max_marks, grade_scale.as_deref())
        .map_err(db_insert)?;
    tracing::info!(exam_id = %exam_id, class_id = %class_id, max_marks, by = %principal.id, "exam created");
    Ok(json!({
        "examId": exam_id,
        "name": name,
        "classId": class_id,
        "maxMarks": max_marks,
        "gradeScale": grade_scale
    }))
}

fn exams_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_principal(params)?;
    let class_id = get_required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;
    let exams = db::list_exams(conn, &class_id).map_err(db_query)?;
    Ok(json!({ "exams": exams }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.create" => Some(with_conn(state, req, subjects_create)),
        "subjects.list" => Some(with_conn(state, req, subjects_list)),
        "exams.create" => Some(with_conn(state, req, exams_create)),
        "exams.list" => Some(with_conn(state, req, exams_list)),
        _ => None,
    }
}
