use serde_json::json;
use thiserror::Error;

/// Validation failures raised by the aggregation engine. Always surfaced to the
/// caller; the engine never substitutes a corrected value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("invalid mark {value} for student {student_id} subject {subject_id}: {reason}")]
    InvalidMark {
        student_id: String,
        subject_id: String,
        value: f64,
        reason: &'static str,
    },

    #[error("invalid max marks: {value}")]
    InvalidMaxMarks { value: f64 },

    #[error("attendance totals disagree: total {total}, present {present}, absent {absent}")]
    InconsistentAttendanceTotals { total: u32, present: u32, absent: u32 },
}

impl CalcError {
    pub fn code(&self) -> &'static str {
        match self {
            CalcError::InvalidMark { .. } => "invalid_mark",
            CalcError::InvalidMaxMarks { .. } => "invalid_max_marks",
            CalcError::InconsistentAttendanceTotals { .. } => "inconsistent_attendance_totals",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            CalcError::InvalidMark {
                student_id,
                subject_id,
                value,
                reason,
            } => json!({
                "studentId": student_id,
                "subjectId": subject_id,
                // NaN/inf are not representable in JSON.
                "value": if value.is_finite() { json!(value) } else { json!(value.to_string()) },
                "reason": reason,
            }),
            CalcError::InvalidMaxMarks { value } => json!({
                "value": if value.is_finite() { json!(value) } else { json!(value.to_string()) },
            }),
            CalcError::InconsistentAttendanceTotals {
                total,
                present,
                absent,
            } => json!({ "total": total, "present": present, "absent": absent }),
        }
    }
}

pub type CalcResult<T> = std::result::Result<T, CalcError>;
