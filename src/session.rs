//! Local attendance marking before submission.
//!
//! A session holds one optional status per roster student for a single class and
//! date. It is rebuilt from the store's records whenever the class or date
//! changes and thrown away after a successful submit.

use crate::model::{AttendanceRecord, AttendanceStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("mark attendance for at least one student")]
    EmptySubmission,

    #[error("student {0} is not on this roster")]
    UnknownStudent(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::EmptySubmission => "empty_submission",
            SessionError::UnknownStudent(_) => "unknown_student",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
}

/// Payload accepted by `attendance.mark`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSubmission {
    pub class_id: String,
    pub date: NaiveDate,
    pub records: Vec<AttendanceEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounts {
    pub present: usize,
    pub absent: usize,
    pub unmarked: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct AttendanceSession {
    class_id: String,
    date: NaiveDate,
    roster: Vec<String>,
    marks: HashMap<String, Option<AttendanceStatus>>,
}

impl AttendanceSession {
    pub fn new<I, S>(class_id: impl Into<String>, date: NaiveDate, roster: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut marks = HashMap::new();
        for id in roster {
            let id = id.into();
            if marks.insert(id.clone(), None).is_none() {
                order.push(id);
            }
        }
        Self {
            class_id: class_id.into(),
            date,
            roster: order,
            marks,
        }
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Clears every entry, then applies the store's existing records for this
    /// date. Records for students outside the roster are skipped.
    pub fn rebuild(&mut self, existing: &[AttendanceRecord]) {
        for v in self.marks.values_mut() {
            *v = None;
        }
        for r in existing {
            if r.date != self.date {
                continue;
            }
            match self.marks.get_mut(&r.student_id) {
                Some(slot) => *slot = Some(r.status),
                None => tracing::debug!(student_id = %r.student_id, "ignoring record for student outside roster"),
            }
        }
    }

    /// Sets `status`, or clears the entry when it already holds `status`.
    /// Returns the entry's new value.
    pub fn select(
        &mut self,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<Option<AttendanceStatus>, SessionError> {
        let slot = self
            .marks
            .get_mut(student_id)
            .ok_or_else(|| SessionError::UnknownStudent(student_id.to_string()))?;
        *slot = if *slot == Some(status) {
            None
        } else {
            Some(status)
        };
        Ok(*slot)
    }

    /// Overwrites every roster entry, whatever it held.
    pub fn mark_all(&mut self, status: AttendanceStatus) {
        for v in self.marks.values_mut() {
            *v = Some(status);
        }
    }

    pub fn status_of(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.marks.get(student_id).copied().flatten()
    }

    pub fn counts(&self) -> SessionCounts {
        let mut counts = SessionCounts {
            total: self.roster.len(),
            ..SessionCounts::default()
        };
        for v in self.marks.values() {
            match v {
                Some(AttendanceStatus::Present) => counts.present += 1,
                Some(AttendanceStatus::Absent) => counts.absent += 1,
                None => counts.unmarked += 1,
            }
        }
        counts
    }

    /// Builds the payload from marked entries only, in roster order.
    pub fn submission(&self) -> Result<AttendanceSubmission, SessionError> {
        let records: Vec<AttendanceEntry> = self
            .roster
            .iter()
            .filter_map(|id| {
                self.status_of(id).map(|status| AttendanceEntry {
                    student_id: id.clone(),
                    status,
                })
            })
            .collect();
        if records.is_empty() {
            return Err(SessionError::EmptySubmission);
        }
        Ok(AttendanceSubmission {
            class_id: self.class_id.clone(),
            date: self.date,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AttendanceStatus::{Absent, Present};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).expect("date")
    }

    fn session() -> AttendanceSession {
        AttendanceSession::new("class-a", day(), ["s1", "s2", "s3"])
    }

    #[test]
    fn selecting_same_status_twice_clears_it() {
        let mut s = session();
        assert_eq!(s.select("s1", Present), Ok(Some(Present)));
        assert_eq!(s.select("s1", Present), Ok(None));
        assert_eq!(s.status_of("s1"), None);
        assert_eq!(s.select("s1", Present), Ok(Some(Present)));
        assert_eq!(s.select("s1", Absent), Ok(Some(Absent)));
    }

    #[test]
    fn mark_all_overwrites_everything() {
        let mut s = session();
        s.select("s2", Absent).expect("select");
        s.mark_all(Present);
        assert_eq!(
            s.counts(),
            SessionCounts {
                present: 3,
                absent: 0,
                unmarked: 0,
                total: 3
            }
        );
        s.mark_all(Absent);
        assert_eq!(s.status_of("s2"), Some(Absent));
        assert_eq!(s.counts().absent, 3);
    }

    #[test]
    fn submission_skips_unset_entries_and_keeps_roster_order() {
        let mut s = session();
        s.select("s3", Absent).expect("select");
        s.select("s1", Present).expect("select");
        let sub = s.submission().expect("submission");
        assert_eq!(sub.class_id, "class-a");
        assert_eq!(sub.date, day());
        assert_eq!(
            sub.records,
            vec![
                AttendanceEntry {
                    student_id: "s1".to_string(),
                    status: Present
                },
                AttendanceEntry {
                    student_id: "s3".to_string(),
                    status: Absent
                },
            ]
        );
    }

    #[test]
    fn empty_submission_is_rejected_even_after_toggling_off() {
        let mut s = session();
        assert_eq!(s.submission(), Err(SessionError::EmptySubmission));
        s.select("s1", Present).expect("select");
        s.select("s1", Present).expect("select");
        assert_eq!(s.submission(), Err(SessionError::EmptySubmission));
    }

    #[test]
    fn unknown_student_is_an_error() {
        let mut s = session();
        assert_eq!(
            s.select("ghost", Present),
            Err(SessionError::UnknownStudent("ghost".to_string()))
        );
    }

    #[test]
    fn rebuild_replaces_local_state_with_store_records() {
        let mut s = session();
        s.mark_all(Absent);
        let other_day = NaiveDate::from_ymd_opt(2025, 9, 2).expect("date");
        s.rebuild(&[
            AttendanceRecord {
                student_id: "s2".to_string(),
                date: day(),
                status: Present,
            },
            AttendanceRecord {
                student_id: "outsider".to_string(),
                date: day(),
                status: Present,
            },
            AttendanceRecord {
                student_id: "s3".to_string(),
                date: other_day,
                status: Absent,
            },
        ]);
        assert_eq!(s.status_of("s1"), None);
        assert_eq!(s.status_of("s2"), Some(Present));
        assert_eq!(s.status_of("s3"), None);
        assert_eq!(s.counts().unmarked, 2);
    }

    #[test]
    fn submission_round_trips_as_wire_payload() {
        let mut s = session();
        s.select("s2", Present).expect("select");
        let json = serde_json::to_value(s.submission().expect("submission")).expect("json");
        assert_eq!(json["classId"], "class-a");
        assert_eq!(json["date"], "2025-09-01");
        assert_eq!(json["records"][0]["studentId"], "s2");
        assert_eq!(json["records"][0]["status"], "Present");
    }
}
