mod common;

use common::{seed_class, str_field, student, teacher, Sidecar};
use serde_json::json;

fn mark_day(sc: &mut Sidecar, class_id: &str, date: &str, records: serde_json::Value) {
    sc.request_ok(
        "attendance.mark",
        json!({
            "principal": teacher(),
            "classId": class_id,
            "date": date,
            "records": records
        }),
    );
}

#[test]
fn student_summary_counts_days_in_range() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut sc = Sidecar::spawn();
    let seeded = seed_class(&mut sc, workspace.path(), &[("Asha", "01"), ("Bilal", "02")]);
    let (s1, s2) = (&seeded.students[0], &seeded.students[1]);

    for (date, status) in [
        ("2025-09-01", "Present"),
        ("2025-09-02", "Present"),
        ("2025-09-03", "Absent"),
        ("2025-09-04", "Present"),
    ] {
        mark_day(
            &mut sc,
            &seeded.class_id,
            date,
            json!([{ "studentId": s1, "status": status }]),
        );
    }
    // Re-marking a day overwrites it rather than adding a record.
    mark_day(
        &mut sc,
        &seeded.class_id,
        "2025-09-04",
        json!([{ "studentId": s1, "status": "Present" }, { "studentId": s2, "status": "Absent" }]),
    );

    let all = sc.request_ok(
        "attendance.studentSummary",
        json!({ "principal": student(s1), "studentId": s1 }),
    );
    assert_eq!(all["summary"]["total"], 4);
    assert_eq!(all["summary"]["present"], 3);
    assert_eq!(all["summary"]["absent"], 1);
    assert_eq!(all["summary"]["percentage"], 75);
    assert_eq!(all["records"].as_array().map(|a| a.len()), Some(4));
    assert_eq!(all["records"][0]["date"], "2025-09-01");

    let ranged = sc.request_ok(
        "attendance.studentSummary",
        json!({
            "principal": teacher(),
            "studentId": s1,
            "startDate": "2025-09-02",
            "endDate": "2025-09-03"
        }),
    );
    assert_eq!(ranged["summary"]["total"], 2);
    assert_eq!(ranged["summary"]["percentage"], 50);

    let empty = sc.request_ok(
        "attendance.studentSummary",
        json!({ "principal": teacher(), "studentId": s1, "startDate": "2026-01-01" }),
    );
    assert_eq!(empty["summary"]["total"], 0);
    assert_eq!(empty["summary"]["percentage"], 0);

    let e = sc.request_err(
        "attendance.studentSummary",
        json!({ "principal": student(s2), "studentId": s1 }),
    );
    assert_eq!(e["code"], "forbidden");

    let e = sc.request_err(
        "attendance.studentSummary",
        json!({
            "principal": teacher(),
            "studentId": s1,
            "startDate": "2025-09-05",
            "endDate": "2025-09-01"
        }),
    );
    assert_eq!(e["code"], "bad_params");
}

#[test]
fn class_statistics_include_students_without_records() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut sc = Sidecar::spawn();
    let seeded = seed_class(
        &mut sc,
        workspace.path(),
        &[("Asha", "01"), ("Bilal", "02"), ("Chen", "03")],
    );
    let (s1, s2, s3) = (&seeded.students[0], &seeded.students[1], &seeded.students[2]);

    mark_day(
        &mut sc,
        &seeded.class_id,
        "2025-09-01",
        json!([{ "studentId": s1, "status": "Present" }, { "studentId": s2, "status": "Absent" }]),
    );
    mark_day(
        &mut sc,
        &seeded.class_id,
        "2025-09-02",
        json!([{ "studentId": s1, "status": "Present" }, { "studentId": s2, "status": "Present" }]),
    );
    mark_day(
        &mut sc,
        &seeded.class_id,
        "2025-09-03",
        json!([{ "studentId": s1, "status": "Absent" }, { "studentId": s2, "status": "Present" }]),
    );

    let stats = sc.request_ok(
        "attendance.classStatistics",
        json!({ "principal": teacher(), "classId": seeded.class_id }),
    );
    let rows = stats["students"].as_array().expect("students");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["studentName"], "Asha");
    assert_eq!(str_field(&rows[0]["attendance"], "studentId"), *s1);
    assert_eq!(rows[0]["attendance"]["percentage"], 67);
    assert_eq!(rows[1]["attendance"]["percentage"], 67);
    assert_eq!(str_field(&rows[2]["attendance"], "studentId"), *s3);
    assert_eq!(rows[2]["attendance"]["total"], 0);
    assert_eq!(rows[2]["attendance"]["percentage"], 0);

    let day = sc.request_ok(
        "attendance.classDate",
        json!({ "principal": teacher(), "classId": seeded.class_id, "date": "2025-09-01" }),
    );
    assert_eq!(day["students"].as_array().map(|a| a.len()), Some(3));
    assert_eq!(day["records"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(day["records"][1]["status"], "Absent");
}

#[test]
fn submissions_are_validated_before_writing() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut sc = Sidecar::spawn();
    let seeded = seed_class(&mut sc, workspace.path(), &[("Asha", "01")]);
    let s1 = &seeded.students[0];

    let e = sc.request_err(
        "attendance.mark",
        json!({
            "principal": teacher(),
            "classId": seeded.class_id,
            "date": "2025-09-01",
            "records": []
        }),
    );
    assert_eq!(e["code"], "empty_submission");

    let e = sc.request_err(
        "attendance.mark",
        json!({
            "principal": teacher(),
            "classId": seeded.class_id,
            "date": "2025-09-01",
            "records": [
                { "studentId": s1, "status": "Present" },
                { "studentId": "ghost", "status": "Absent" }
            ]
        }),
    );
    assert_eq!(e["code"], "unknown_student");

    let e = sc.request_err(
        "attendance.mark",
        json!({
            "principal": teacher(),
            "classId": seeded.class_id,
            "date": "2025-09-01",
            "records": [{ "studentId": s1, "status": "Late" }]
        }),
    );
    assert_eq!(e["code"], "bad_params");

    let e = sc.request_err(
        "attendance.mark",
        json!({
            "principal": student(s1),
            "classId": seeded.class_id,
            "date": "2025-09-01",
            "records": [{ "studentId": s1, "status": "Present" }]
        }),
    );
    assert_eq!(e["code"], "forbidden");

    let summary = sc.request_ok(
        "attendance.studentSummary",
        json!({ "principal": teacher(), "studentId": s1 }),
    );
    assert_eq!(summary["summary"]["total"], 0);
}
