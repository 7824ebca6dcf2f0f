use crate::db;
use crate::ipc::helpers::{
    db_insert, db_query, get_optional_str, get_required_str, require_principal,
    require_teacher, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn classes_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let principal = require_teacher(params)?;
    let name = get_required_str(params, "name")?;
    let section = get_optional_str(params, "section")?.unwrap_or_default();
    // The creating teacher becomes class teacher unless another is named.
    let class_teacher_id =
        get_optional_str(params, "classTeacherId")?.unwrap_or_else(|| principal.id.clone());

    let class_id =
        db::insert_class(conn, &name, &section, Some(&class_teacher_id)).map_err(db_insert)?;
    tracing::info!(class_id = %class_id, by = %principal.id, "class created");
    Ok(json!({
        "classId": class_id,
        "name": name,
        "section": section,
        "classTeacherId": class_teacher_id
    }))
}

fn classes_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_principal(params)?;
    let classes = db::list_classes(conn).map_err(db_query)?;
    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(with_conn(state, req, classes_create)),
        "classes.list" => Some(with_conn(state, req, classes_list)),
        _ => None,
    }
}
