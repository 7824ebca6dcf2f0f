use crate::db;
use crate::ipc::helpers::{
    db_insert, db_query, get_optional_str, get_required_str, require_teacher, with_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_teacher(params)?;
    let full_name = get_required_str(params, "fullName")?;
    let roll_no = get_required_str(params, "rollNo")?;
    let class_id = get_optional_str(params, "classId")?;
    if let Some(class_id) = class_id.as_deref() {
        if !db::class_exists(conn, class_id).map_err(db_query)? {
            return Err(HandlerErr::not_found("class not found"));
        }
    }

    let student_id =
        db::insert_student(conn, &full_name, &roll_no, class_id.as_deref()).map_err(db_insert)?;
    Ok(json!({
        "studentId": student_id,
        "fullName": full_name,
        "rollNo": roll_no,
        "classId": class_id
    }))
}

/// Roster for `classId`, or students without a class when `classId` is absent.
fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_teacher(params)?;
    let students = match get_optional_str(params, "classId")? {
        Some(class_id) => {
            if !db::class_exists(conn, &class_id).map_err(db_query)? {
                return Err(HandlerErr::not_found("class not found"));
            }
            db::list_students_for_class(conn, &class_id).map_err(db_query)?
        }
        None => db::list_unassigned_students(conn).map_err(db_query)?,
    };
    Ok(json!({ "students": students }))
}

fn students_assign_class(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let principal = require_teacher(params)?;
    let class_id = get_required_str(params, "classId")?;
    let student_ids: Vec<String> = params
        .get("studentIds")
        .and_then(|v| v.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    if student_ids.is_empty() {
        return Err(HandlerErr::bad_params("studentIds must be a non-empty array"));
    }
    if !db::class_exists(conn, &class_id).map_err(db_query)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    let assigned = db::assign_students(conn, &class_id, &student_ids)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    tracing::info!(class_id = %class_id, assigned, by = %principal.id, "students assigned");
    Ok(json!({ "assigned": assigned }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.assignClass" => Some(with_conn(state, req, students_assign_class)),
        _ => None,
    }
}
