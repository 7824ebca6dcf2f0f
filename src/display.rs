//! Display ordering over an already-ranked list.
//!
//! This is a view over the engine's output and never changes `rank`. Sorting by
//! rank reads the carried rank field rather than looking up list positions.

use crate::calc::RankedResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankListEntry {
    #[serde(flatten)]
    pub result: RankedResult,
    pub student_name: String,
    pub roll_no: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Rank,
    Name,
    Marks,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayQuery {
    pub search: Option<String>,
    pub sort_by: SortKey,
    pub order: SortOrder,
}

fn matches_search(entry: &RankListEntry, needle: &str) -> bool {
    entry.student_name.to_lowercase().contains(needle)
        || entry.roll_no.to_lowercase().contains(needle)
        // f64 Display prints 80.0 as "80", matching what users type.
        || entry.result.total_marks.to_string().contains(needle)
}

fn compare(a: &RankListEntry, b: &RankListEntry, key: SortKey) -> Ordering {
    match key {
        SortKey::Rank => a.result.rank.cmp(&b.result.rank),
        SortKey::Name => a
            .student_name
            .to_lowercase()
            .cmp(&b.student_name.to_lowercase()),
        SortKey::Marks => a.result.total_marks.total_cmp(&b.result.total_marks),
    }
}

/// Filters and orders entries for display. Sorting is stable: entries that
/// compare equal stay in the order they were given.
pub fn arrange<'a>(entries: &'a [RankListEntry], query: &DisplayQuery) -> Vec<&'a RankListEntry> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut out: Vec<&RankListEntry> = entries
        .iter()
        .filter(|e| needle.as_deref().map(|n| matches_search(e, n)).unwrap_or(true))
        .collect();

    out.sort_by(|a, b| {
        let ord = compare(a, b, query.sort_by);
        match query.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
    out
}
