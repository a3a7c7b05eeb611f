//! Seams between the engine and the external stores it reads from.
//!
//! The roster resolver and the five event sources are external
//! collaborators; the engine only consumes them read-only through these
//! traits. HTTP-backed implementations for the scheduling API live in
//! `client`; tests substitute in-memory doubles.

mod client;
mod error;

pub use client::{
    ApiClient, AuditionSource, CallbackSource, HttpRosterResolver, PersonalCalendarSource,
    ProductionEventSource, RehearsalSource,
};
pub use error::ApiError;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CommitmentEvent, DayRange, EventKind, Person, PersonId, ProductionId};

/// Resolves the set of people relevant for conflict checking on a
/// production: cast plus production team. Duplicate ids are tolerated; the
/// engine dedupes by `person_id`.
#[async_trait]
pub trait RosterResolver: Send + Sync {
    async fn resolve_roster(&self, production_id: &ProductionId) -> Result<Vec<Person>>;
}

/// One of the five calendar stores, already normalized to `CommitmentEvent`.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn kind(&self) -> EventKind;

    /// One batched read covering every listed person over the whole day
    /// range. Implementations must not fan out per person or per day.
    async fn read_events(
        &self,
        person_ids: &[PersonId],
        range: DayRange,
    ) -> Result<Vec<CommitmentEvent>>;
}

/// The five sources the engine aggregates, one per `EventKind`.
pub struct SourceSet {
    sources: Vec<Arc<dyn EventSource>>,
}

impl SourceSet {
    pub fn new(
        rehearsals: Arc<dyn EventSource>,
        production_events: Arc<dyn EventSource>,
        callbacks: Arc<dyn EventSource>,
        auditions: Arc<dyn EventSource>,
        personal_calendar: Arc<dyn EventSource>,
    ) -> Self {
        let sources = vec![
            rehearsals,
            production_events,
            callbacks,
            auditions,
            personal_calendar,
        ];
        for (source, expected) in sources.iter().zip(EventKind::ALL) {
            debug_assert_eq!(source.kind(), expected, "source passed in wrong position");
        }
        Self { sources }
    }

    /// All five sources backed by the same API client.
    pub fn http(api: &ApiClient) -> Self {
        Self::new(
            Arc::new(RehearsalSource::new(api.clone())),
            Arc::new(ProductionEventSource::new(api.clone())),
            Arc::new(CallbackSource::new(api.clone())),
            Arc::new(AuditionSource::new(api.clone())),
            Arc::new(PersonalCalendarSource::new(api.clone())),
        )
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn EventSource>> {
        self.sources.iter()
    }
}
