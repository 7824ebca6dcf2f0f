use super::grade::{grade_for, Grade};
use super::round_off_2_decimals;
use crate::error::{CalcError, CalcResult};
use crate::model::MarkRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display tier for the first three sorted positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Gold,
    Silver,
    Bronze,
}

impl Tier {
    /// Strictly positional: equal totals straddling position 3 do not share bronze.
    pub fn for_position(index: usize) -> Option<Tier> {
        match index {
            0 => Some(Tier::Gold),
            1 => Some(Tier::Silver),
            2 => Some(Tier::Bronze),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub student_id: String,
    pub subject_count: usize,
    pub total_marks: f64,
    pub total_max: f64,
    pub percentage: f64,
    pub grade: Grade,
    /// 1-based position in the sorted list.
    pub rank: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// Another result has the same `total_marks`.
    pub tied: bool,
}

/// Checks one mark against the maximum that applies to it.
pub fn validate_mark(
    student_id: &str,
    subject_id: &str,
    marks_scored: f64,
    max_marks: f64,
) -> CalcResult<()> {
    if !max_marks.is_finite() || max_marks <= 0.0 {
        return Err(CalcError::InvalidMaxMarks { value: max_marks });
    }
    let reason = if !marks_scored.is_finite() {
        "not a finite number"
    } else if marks_scored < 0.0 {
        "negative marks are not allowed"
    } else if marks_scored > max_marks {
        "marks exceed the maximum"
    } else {
        return Ok(());
    };
    Err(CalcError::InvalidMark {
        student_id: student_id.to_string(),
        subject_id: subject_id.to_string(),
        value: marks_scored,
        reason,
    })
}

/// Ranks every student that has at least one mark record for the exam.
///
/// Students are ordered by total marks, highest first. Equal totals keep the
/// order in which the students first appear in `records`; no secondary key is
/// applied. Any invalid record fails the whole call.
///
/// Totals and percentages are reported at 2-decimal precision, so totals that
/// differ only beyond the second decimal compare equal and are marked `tied`.
pub fn compute_rank_list(
    exam_max_marks: f64,
    records: &[MarkRecord],
) -> CalcResult<Vec<RankedResult>> {
    rank_students(exam_max_marks, records, &[])
}

/// Like [`compute_rank_list`], but roster students without any record are
/// included with zero totals. They follow the students seen in `records`, in
/// roster order.
pub fn compute_rank_list_with_roster(
    exam_max_marks: f64,
    records: &[MarkRecord],
    roster: &[String],
) -> CalcResult<Vec<RankedResult>> {
    rank_students(exam_max_marks, records, roster)
}

struct StudentTally<'a> {
    student_id: &'a str,
    // (subject, scored, max) in first-seen subject order
    subjects: Vec<(&'a str, f64, f64)>,
}

fn rank_students<'a>(
    exam_max_marks: f64,
    records: &'a [MarkRecord],
    roster: &'a [String],
) -> CalcResult<Vec<RankedResult>> {
    if !exam_max_marks.is_finite() || exam_max_marks <= 0.0 {
        return Err(CalcError::InvalidMaxMarks {
            value: exam_max_marks,
        });
    }
    for r in records {
        validate_mark(
            &r.student_id,
            &r.subject_id,
            r.marks_scored,
            r.max_marks.unwrap_or(exam_max_marks),
        )?;
    }

    let mut tallies: Vec<StudentTally<'a>> = Vec::new();
    let mut slot_by_student: HashMap<&'a str, usize> = HashMap::new();
    for r in records {
        let slot = *slot_by_student
            .entry(r.student_id.as_str())
            .or_insert_with(|| {
                tallies.push(StudentTally {
                    student_id: r.student_id.as_str(),
                    subjects: Vec::new(),
                });
                tallies.len() - 1
            });
        let max = r.max_marks.unwrap_or(exam_max_marks);
        let tally = &mut tallies[slot];
        // Later record for the same subject replaces the earlier one in place.
        match tally
            .subjects
            .iter_mut()
            .find(|(subject, _, _)| *subject == r.subject_id)
        {
            Some(entry) => {
                entry.1 = r.marks_scored;
                entry.2 = max;
            }
            None => tally
                .subjects
                .push((r.subject_id.as_str(), r.marks_scored, max)),
        }
    }
    for student_id in roster {
        if slot_by_student.contains_key(student_id.as_str()) {
            continue;
        }
        slot_by_student.insert(student_id.as_str(), tallies.len());
        tallies.push(StudentTally {
            student_id: student_id.as_str(),
            subjects: Vec::new(),
        });
    }

    let mut results: Vec<RankedResult> = tallies
        .into_iter()
        .map(|t| {
            // Totals are kept at storage precision so equal decimal sums compare equal.
            let total_marks = round_off_2_decimals(t.subjects.iter().map(|s| s.1).sum::<f64>());
            let total_max = round_off_2_decimals(t.subjects.iter().map(|s| s.2).sum::<f64>());
            let percentage = if total_max > 0.0 {
                round_off_2_decimals(100.0 * total_marks / total_max)
            } else {
                0.0
            };
            RankedResult {
                student_id: t.student_id.to_string(),
                subject_count: t.subjects.len(),
                total_marks,
                total_max,
                percentage,
                grade: grade_for(percentage),
                rank: 0,
                tier: None,
                tied: false,
            }
        })
        .collect();

    // `sort_by` is stable.
    results.sort_by(|a, b| b.total_marks.total_cmp(&a.total_marks));

    let n = results.len();
    for i in 0..n {
        let total = results[i].total_marks;
        let tied = (i > 0 && results[i - 1].total_marks == total)
            || (i + 1 < n && results[i + 1].total_marks == total);
        let r = &mut results[i];
        r.rank = i + 1;
        r.tier = Tier::for_position(i);
        r.tied = tied;
    }

    tracing::debug!(
        records = records.len(),
        students = n,
        "computed rank list"
    );
    Ok(results)
}
