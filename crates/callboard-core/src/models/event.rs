use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

use super::person::{PersonId, ProductionId};

/// The closed set of calendar sources the engine aggregates.
/// A new source must extend this enum; nothing duck-types on row structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub enum EventKind {
    Rehearsal,
    ProductionEvent,
    Callback,
    Audition,
    PersonalCalendar,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Rehearsal,
        EventKind::ProductionEvent,
        EventKind::Callback,
        EventKind::Audition,
        EventKind::PersonalCalendar,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Rehearsal => "rehearsal",
            EventKind::ProductionEvent => "production event",
            EventKind::Callback => "callback",
            EventKind::Audition => "audition",
            EventKind::PersonalCalendar => "personal calendar",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Opaque reference back to the originating record, for drill-through in the
/// scheduling UI. Never interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct SourceRef(pub String);

impl SourceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open interval `[start, end)` of absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Half-open overlap, applied identically for every event kind.
    /// Zero-duration ranges overlap nothing.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// When a commitment happens: a concrete instant range, or a whole calendar
/// day for all-day personal entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub enum EventTime {
    Timed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    AllDay {
        date: NaiveDate,
    },
}

impl EventTime {
    /// Concrete `[start, end)` instants. All-day entries span the full
    /// venue-local day defined by `day_offset`, not UTC midnight.
    pub fn resolve(&self, day_offset: FixedOffset) -> TimeRange {
        match *self {
            EventTime::Timed { start, end } => TimeRange { start, end },
            EventTime::AllDay { date } => {
                let start = day_start(date, day_offset);
                // A fixed offset has no DST transitions, so a local day is
                // exactly 24 hours.
                TimeRange {
                    start,
                    end: start + Duration::days(1),
                }
            }
        }
    }

    /// Venue-local calendar day the commitment is bucketed under.
    pub fn day_key(&self, day_offset: FixedOffset) -> NaiveDate {
        match *self {
            EventTime::Timed { start, .. } => start.with_timezone(&day_offset).date_naive(),
            EventTime::AllDay { date } => date,
        }
    }
}

/// Midnight at the start of `date` in the given UTC offset, as an instant.
pub(crate) fn day_start(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    match date.and_time(NaiveTime::MIN).and_local_timezone(offset) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // Unreachable for a fixed offset, which has no gaps or folds.
        _ => Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)),
    }
}

/// Inclusive calendar-day range for batched source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct DayRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DayRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// A single scheduled obligation for one person, normalized from one of the
/// five sources. Constructed fresh per query, immutable, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct CommitmentEvent {
    pub person_id: PersonId,
    pub kind: EventKind,
    pub title: String,
    pub time: EventTime,
    /// Owning production, if any. Personal-calendar entries have none.
    pub production_id: Option<ProductionId>,
    pub source_ref: SourceRef,
}
