//! Domain model for conflict detection.
//!
//! Every calendar source maps its native rows into these types at the
//! boundary; the engine itself never inspects source-specific fields.

pub mod conflict;
pub mod event;
pub mod person;

pub use conflict::{
    ConflictEntry, ConflictReport, ConflictSummary, RangeConflictReport, SourceFailure,
};
pub use event::{CommitmentEvent, DayRange, EventKind, EventTime, SourceRef, TimeRange};
pub use person::{Person, PersonId, ProductionId};
