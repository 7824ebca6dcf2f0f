mod common;

use common::{seed_class, teacher, Sidecar};
use serde_json::json;

#[test]
fn bundle_roundtrip_restores_marks_into_new_workspace() {
    let src = tempfile::tempdir().expect("tempdir");
    let dst = tempfile::tempdir().expect("tempdir");
    let bundle = src.path().join("out").join("school.zip");

    let mut sc = Sidecar::spawn();
    let seeded = seed_class(&mut sc, src.path(), &[("Asha", "01")]);
    sc.request_ok(
        "marks.upsert",
        json!({
            "principal": teacher(),
            "examId": seeded.exam_id,
            "entries": [{
                "studentId": seeded.students[0],
                "subjectId": seeded.subjects[0],
                "marksScored": 77
            }]
        }),
    );

    let exported = sc.request_ok(
        "backup.exportWorkspaceBundle",
        json!({ "principal": teacher(), "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], "schoold-workspace-v1");
    let sha = exported["dbSha256"].as_str().expect("sha").to_string();
    assert_eq!(sha.len(), 64);

    let imported = sc.request_ok(
        "backup.importWorkspaceBundle",
        json!({
            "principal": teacher(),
            "inPath": bundle.to_string_lossy(),
            "workspacePath": dst.path().to_string_lossy()
        }),
    );
    assert_eq!(imported["dbSha256"], sha.as_str());

    let health = sc.request_ok("health", json!({}));
    assert_eq!(
        health["workspacePath"],
        dst.path().to_string_lossy().as_ref()
    );
    let ranked = sc.request_ok(
        "marks.rankList",
        json!({ "principal": teacher(), "examId": seeded.exam_id }),
    );
    assert_eq!(ranked["rankList"][0]["totalMarks"], 77.0);
}

#[test]
fn backup_requires_teacher_and_existing_bundle() {
    let ws = tempfile::tempdir().expect("tempdir");
    let mut sc = Sidecar::spawn();
    sc.request_ok(
        "workspace.select",
        json!({ "path": ws.path().to_string_lossy() }),
    );

    let e = sc.request_err(
        "backup.exportWorkspaceBundle",
        json!({
            "principal": { "id": "s1", "role": "student" },
            "outPath": ws.path().join("x.zip").to_string_lossy()
        }),
    );
    assert_eq!(e["code"], "forbidden");

    let e = sc.request_err(
        "backup.importWorkspaceBundle",
        json!({
            "principal": teacher(),
            "inPath": ws.path().join("missing.zip").to_string_lossy()
        }),
    );
    assert_eq!(e["code"], "not_found");
    sc.request_ok("classes.list", json!({ "principal": teacher() }));
}

fn class_names(sc: &mut Sidecar) -> Vec<String> {
    let listed = sc.request_ok("classes.list", json!({ "principal": teacher() }));
    listed["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .map(|c| c["name"].as_str().expect("name").to_string())
        .collect()
}

#[test]
fn non_sqlite_file_is_rejected_and_workspace_keeps_its_data() {
    let ws = tempfile::tempdir().expect("tempdir");
    let mut sc = Sidecar::spawn();
    seed_class(&mut sc, ws.path(), &[("Asha", "01")]);
    let notes = ws.path().join("notes.txt");
    std::fs::write(&notes, "hello, definitely not sqlite").expect("write notes");

    let e = sc.request_err(
        "backup.importWorkspaceBundle",
        json!({ "principal": teacher(), "inPath": notes.to_string_lossy() }),
    );
    assert_eq!(e["code"], "io_failed");
    assert_eq!(class_names(&mut sc), vec!["Grade 7"]);

    sc.request_ok(
        "workspace.select",
        json!({ "path": ws.path().to_string_lossy() }),
    );
    assert_eq!(class_names(&mut sc), vec!["Grade 7"]);
}

#[test]
fn broken_zip_keeps_workspace_open() {
    let ws = tempfile::tempdir().expect("tempdir");
    let mut sc = Sidecar::spawn();
    seed_class(&mut sc, ws.path(), &[("Asha", "01")]);
    let broken = ws.path().join("broken.zip");
    std::fs::write(&broken, b"PK\x03\x04garbage").expect("write zip");

    let e = sc.request_err(
        "backup.importWorkspaceBundle",
        json!({ "principal": teacher(), "inPath": broken.to_string_lossy() }),
    );
    assert_eq!(e["code"], "io_failed");

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["workspaceOpen"], true);
    assert_eq!(class_names(&mut sc), vec!["Grade 7"]);
}

#[test]
fn database_that_fails_to_open_is_rolled_back() {
    let ws = tempfile::tempdir().expect("tempdir");
    let mut sc = Sidecar::spawn();
    seed_class(&mut sc, ws.path(), &[("Asha", "01")]);

    // Valid SQLite, but its students table lacks the columns the workspace needs.
    let foreign = ws.path().join("foreign.sqlite3");
    {
        let conn = rusqlite::Connection::open(&foreign).expect("create foreign db");
        conn.execute_batch("CREATE TABLE students(id TEXT PRIMARY KEY);")
            .expect("create table");
    }

    let e = sc.request_err(
        "backup.importWorkspaceBundle",
        json!({ "principal": teacher(), "inPath": foreign.to_string_lossy() }),
    );
    assert_eq!(e["code"], "db_open_failed");
    assert_eq!(class_names(&mut sc), vec!["Grade 7"]);
    assert!(!ws.path().join("schoold.sqlite3.previous").exists());
}
