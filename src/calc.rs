//! Aggregation engine: exam rank lists, letter grades and attendance ratios.
//!
//! Everything here is a pure function over caller-supplied snapshots. Nothing
//! touches the database and nothing keeps state between calls, so the same input
//! always yields the same output and calls may run concurrently.

mod attendance;
mod grade;
mod rank;

pub use attendance::{
    compute_attendance_summary, compute_class_attendance, summarize_tally, AttendanceSummary,
    AttendanceTally, StudentAttendance,
};
pub use grade::{grade_for, Grade};
pub use rank::{
    compute_rank_list, compute_rank_list_with_roster, validate_mark, RankedResult, Tier,
};

/// Half-up rounding to 2 decimals: `Int(100*x + 0.5) / 100`.
/// Inputs are non-negative aggregates, so half-up and half-away-from-zero agree.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Half-up rounding to the nearest whole number.
pub fn round_off_whole(x: f64) -> f64 {
    (x + 0.5).floor()
}
