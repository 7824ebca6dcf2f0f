#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_schoold");
        let mut child = Command::new(exe)
            .env_remove("SCHOOLD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn schoold");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Returns the error object of a failed call, panicking if it succeeded.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().expect("error object")
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn teacher() -> serde_json::Value {
    json!({ "id": "t-1", "role": "teacher" })
}

pub fn student(id: &str) -> serde_json::Value {
    json!({ "id": id, "role": "student" })
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

pub struct SeededClass {
    pub class_id: String,
    pub students: Vec<String>,
    pub subjects: Vec<String>,
    pub exam_id: String,
}

/// Opens `workspace`, then creates one class with the given roll numbers, two
/// subjects (Math, Science) and a 100-mark exam.
pub fn seed_class(sc: &mut Sidecar, workspace: &std::path::Path, rolls: &[(&str, &str)]) -> SeededClass {
    sc.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = sc.request_ok(
        "classes.create",
        json!({ "principal": teacher(), "name": "Grade 7", "section": "B" }),
    );
    let class_id = str_field(&class, "classId");

    let students = rolls
        .iter()
        .map(|(name, roll)| {
            let s = sc.request_ok(
                "students.create",
                json!({
                    "principal": teacher(),
                    "fullName": name,
                    "rollNo": roll,
                    "classId": class_id
                }),
            );
            str_field(&s, "studentId")
        })
        .collect();

    let subjects = ["Math", "Science"]
        .iter()
        .map(|name| {
            let s = sc.request_ok(
                "subjects.create",
                json!({ "principal": teacher(), "name": name, "classId": class_id }),
            );
            str_field(&s, "subjectId")
        })
        .collect();

    let exam = sc.request_ok(
        "exams.create",
        json!({
            "principal": teacher(),
            "name": "Midterm",
            "classId": class_id,
            "maxMarks": 100,
            "gradeScale": "standard"
        }),
    );
    SeededClass {
        class_id,
        students,
        subjects,
        exam_id: str_field(&exam, "examId"),
    }
}
