use crate::calc::{
    compute_rank_list, compute_rank_list_with_roster, round_off_2_decimals, validate_mark,
    RankedResult,
};
use crate::db;
use crate::display::{arrange, DisplayQuery, RankListEntry};
use crate::ipc::helpers::{
    db_insert, db_query, db_tx, get_required_str, require_principal, require_teacher, with_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Exam, Student};
use rusqlite::Connection;
use serde_json::json;
use std::collections::{HashMap, HashSet};

struct MarkEntry {
    student_id: String,
    subject_id: String,
    marks_scored: f64,
}

fn load_exam(conn: &Connection, params: &serde_json::Value) -> Result<Exam, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    db::get_exam(conn, &exam_id)
        .map_err(db_query)?
        .ok_or_else(|| HandlerErr::not_found("exam not found"))
}

/// Numbers pass through; numeric strings are parsed. Anything else becomes NaN
/// so the engine reports it as an invalid mark with the offending ids attached.
fn parse_marks_value(v: Option<&serde_json::Value>) -> f64 {
    match v {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn parse_entries(params: &serde_json::Value) -> Result<Vec<MarkEntry>, HandlerErr> {
    let Some(raw) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing entries"));
    };
    if raw.is_empty() {
        return Err(HandlerErr::bad_params("entries must not be empty"));
    }
    let mut out = Vec::with_capacity(raw.len());
    for (i, item) in raw.iter().enumerate() {
        let field = |key: &str| {
            item.get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| HandlerErr::bad_params(format!("entries[{}]: missing {}", i, key)))
        };
        out.push(MarkEntry {
            student_id: field("studentId")?,
            subject_id: field("subjectId")?,
            // Stored at the precision the rank list reports.
            marks_scored: round_off_2_decimals(parse_marks_value(item.get("marksScored"))),
        });
    }
    Ok(out)
}

fn marks_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let principal = require_teacher(params)?;
    let exam = load_exam(conn, params)?;
    let entries = parse_entries(params)?;

    let roster: HashSet<String> = db::list_students_for_class(conn, &exam.class_id)
        .map_err(db_query)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    let subjects: HashSet<String> = db::list_subjects(conn, &exam.class_id)
        .map_err(db_query)?
        .into_iter()
        .map(|s| s.id)
        .collect();

    let max = exam.max_marks as f64;
    for e in &entries {
        if !roster.contains(&e.student_id) {
            return Err(HandlerErr::not_found("student not in exam class")
                .with_details(json!({ "studentId": e.student_id })));
        }
        if !subjects.contains(&e.subject_id) {
            return Err(HandlerErr::not_found("subject not in exam class")
                .with_details(json!({ "subjectId": e.subject_id })));
        }
        validate_mark(&e.student_id, &e.subject_id, e.marks_scored, max)?;
    }

    let tx = conn.unchecked_transaction().map_err(db_tx)?;
    for e in &entries {
        db::upsert_mark(&tx, &exam.id, &e.student_id, &e.subject_id, e.marks_scored)
            .map_err(db_insert)?;
    }
    tx.commit().map_err(db_tx)?;

    tracing::info!(exam_id = %exam.id, count = entries.len(), by = %principal.id, "marks saved");
    Ok(json!({ "examId": exam.id, "saved": entries.len() }))
}

fn rank_list_entries(
    ranked: Vec<RankedResult>,
    students: &HashMap<String, Student>,
) -> Vec<RankListEntry> {
    ranked
        .into_iter()
        .map(|result| {
            let (student_name, roll_no) = students
                .get(&result.student_id)
                .map(|s| (s.full_name.clone(), s.roll_no.clone()))
                .unwrap_or_default();
            RankListEntry {
                result,
                student_name,
                roll_no,
            }
        })
        .collect()
}

fn compute_for_exam(
    conn: &Connection,
    exam: &Exam,
    include_roster: bool,
) -> Result<(Vec<RankedResult>, HashMap<String, Student>), HandlerErr> {
    let records = db::fetch_mark_records(conn, &exam.id).map_err(db_query)?;
    let class_students = db::list_students_for_class(conn, &exam.class_id).map_err(db_query)?;
    let max = exam.max_marks as f64;
    let ranked = if include_roster {
        let roster: Vec<String> = class_students.iter().map(|s| s.id.clone()).collect();
        compute_rank_list_with_roster(max, &records, &roster)?
    } else {
        compute_rank_list(max, &records)?
    };

    let mut students: HashMap<String, Student> = class_students
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    // Marks can outlive a class move; look those students up individually.
    for r in &ranked {
        if !students.contains_key(&r.student_id) {
            if let Some(s) = db::get_student(conn, &r.student_id).map_err(db_query)? {
                students.insert(s.id.clone(), s);
            }
        }
    }
    Ok((ranked, students))
}

fn marks_rank_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_teacher(params)?;
    let exam = load_exam(conn, params)?;
    let include_roster = params
        .get("includeRoster")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let display: Option<DisplayQuery> = match params.get("display").filter(|v| !v.is_null()) {
        Some(raw) => Some(
            serde_json::from_value(raw.clone())
                .map_err(|e| HandlerErr::bad_params(format!("invalid display: {}", e)))?,
        ),
        None => None,
    };

    let (ranked, students) = compute_for_exam(conn, &exam, include_roster)?;
    let entries = rank_list_entries(ranked, &students);

    let mut result = json!({
        "examId": exam.id,
        "examName": exam.name,
        "maxMarks": exam.max_marks,
        "gradeScale": exam.grade_scale,
        "rankList": entries,
    });
    if let Some(query) = display {
        result["view"] = json!(arrange(&entries, &query));
    }
    Ok(result)
}

fn marks_student_exam(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let principal = require_principal(params)?;
    let student_id = get_required_str(params, "studentId")?;
    if !principal.can_view_student(&student_id) {
        return Err(HandlerErr::forbidden("cannot view another student's marks"));
    }
    let exam = load_exam(conn, params)?;
    let student = db::get_student(conn, &student_id)
        .map_err(db_query)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;

    let subjects = db::fetch_student_exam_marks(conn, &exam.id, &student.id).map_err(db_query)?;
    let (ranked, _) = compute_for_exam(conn, &exam, false)?;
    let standing = ranked.into_iter().find(|r| r.student_id == student.id);

    Ok(json!({
        "examId": exam.id,
        "examName": exam.name,
        "student": student,
        "subjects": subjects,
        "result": standing
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.upsert" => Some(with_conn(state, req, marks_upsert)),
        "marks.rankList" => Some(with_conn(state, req, marks_rank_list)),
        "marks.studentExam" => Some(with_conn(state, req, marks_student_exam)),
        _ => None,
    }
}
