use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

use super::event::{EventKind, EventTime, SourceRef};
use super::person::Person;

/// One overlapping commitment for one person. A person appears once per
/// overlapping commitment, so three mutually overlapping commitments produce
/// three entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ConflictEntry {
    pub person: Person,
    pub kind: EventKind,
    pub title: String,
    pub time: EventTime,
    pub source_ref: SourceRef,
}

/// All conflicts found for one calendar day (or for one reference window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ConflictSummary {
    pub date: NaiveDate,
    pub conflicts: Vec<ConflictEntry>,
    pub total_conflicts: usize,
}

impl ConflictSummary {
    /// Builds a summary, keeping `total_conflicts == conflicts.len()`.
    pub fn new(date: NaiveDate, conflicts: Vec<ConflictEntry>) -> Self {
        let total_conflicts = conflicts.len();
        Self {
            date,
            conflicts,
            total_conflicts,
        }
    }

    pub fn empty(date: NaiveDate) -> Self {
        Self::new(date, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// A source read that failed while the rest of the fan-out succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct SourceFailure {
    pub kind: EventKind,
    pub message: String,
}

/// Result of checking one reference window. `failed_sources` lists the
/// sources whose reads failed under the partial-results policy; conflicts
/// from the healthy sources are still present in `summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ConflictReport {
    pub summary: ConflictSummary,
    pub failed_sources: Vec<SourceFailure>,
}

/// Result of a range query. The map is sparse: a day with zero conflicts is
/// absent, not present with an empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct RangeConflictReport {
    pub days: BTreeMap<NaiveDate, ConflictSummary>,
    pub failed_sources: Vec<SourceFailure>,
}

impl RangeConflictReport {
    pub fn total_conflicts(&self) -> usize {
        self.days.values().map(|s| s.total_conflicts).sum()
    }
}
