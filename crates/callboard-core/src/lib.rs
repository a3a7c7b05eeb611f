//! callboard-core - scheduling-conflict detection for theatrical productions.
//!
//! Production staff scheduling a rehearsal, callback or audition need to know
//! who on the roster is already committed elsewhere. This crate aggregates
//! per-person calendar commitments from five sources (rehearsals, production
//! events, callbacks, audition signups, personal calendars) and reports
//! overlapping time ranges, per person per day.
//!
//! The engine is read-only, stateless and advisory: every query re-fetches
//! and recomputes, and no error here should ever block the scheduling action
//! itself.

pub mod config;
pub mod detector;
pub mod error;
pub mod models;
pub mod sources;

pub use config::{DetectorConfig, FailurePolicy};
pub use detector::ConflictDetector;
pub use error::ConflictError;
pub use models::{
    CommitmentEvent, ConflictEntry, ConflictReport, ConflictSummary, DayRange, EventKind,
    EventTime, Person, PersonId, ProductionId, RangeConflictReport, SourceFailure, SourceRef,
    TimeRange,
};
pub use sources::{ApiClient, EventSource, HttpRosterResolver, RosterResolver, SourceSet};
