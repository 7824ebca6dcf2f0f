use super::round_off_whole;
use crate::error::{CalcError, CalcResult};
use crate::model::{AttendanceRecord, AttendanceStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw counts as reported by the store, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTally {
    pub total: u32,
    pub present: u32,
    pub absent: u32,
}

impl AttendanceTally {
    pub fn record(&mut self, status: AttendanceStatus) {
        self.total += 1;
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    /// Whole percent. A student with no recorded days reports 0.
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendance {
    pub student_id: String,
    #[serde(flatten)]
    pub summary: AttendanceSummary,
}

pub fn summarize_tally(tally: AttendanceTally) -> CalcResult<AttendanceSummary> {
    let AttendanceTally {
        total,
        present,
        absent,
    } = tally;
    if u64::from(present) + u64::from(absent) != u64::from(total) {
        return Err(CalcError::InconsistentAttendanceTotals {
            total,
            present,
            absent,
        });
    }
    let percentage = if total > 0 {
        round_off_whole(100.0 * f64::from(present) / f64::from(total)) as u32
    } else {
        0
    };
    Ok(AttendanceSummary {
        total,
        present,
        absent,
        percentage,
    })
}

/// Summary over one student's records for a date range.
pub fn compute_attendance_summary(records: &[AttendanceRecord]) -> CalcResult<AttendanceSummary> {
    let mut tally = AttendanceTally::default();
    for r in records {
        tally.record(r.status);
    }
    summarize_tally(tally)
}

/// Per-student summaries, in order of each student's first record.
pub fn compute_class_attendance(
    records: &[AttendanceRecord],
) -> CalcResult<Vec<StudentAttendance>> {
    let mut order: Vec<(&str, AttendanceTally)> = Vec::new();
    let mut slot_by_student: HashMap<&str, usize> = HashMap::new();
    for r in records {
        let slot = *slot_by_student
            .entry(r.student_id.as_str())
            .or_insert_with(|| {
                order.push((r.student_id.as_str(), AttendanceTally::default()));
                order.len() - 1
            });
        order[slot].1.record(r.status);
    }
    order
        .into_iter()
        .map(|(student_id, tally)| {
            Ok(StudentAttendance {
                student_id: student_id.to_string(),
                summary: summarize_tally(tally)?,
            })
        })
        .collect()
}
