//! Conflict detection across the five calendar sources.
//!
//! Stateless and read-only: every query resolves the roster once, fans out
//! one batched read per source, merges the results into per-day buckets and
//! applies the half-open overlap predicate. Nothing is cached between calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::{DetectorConfig, FailurePolicy};
use crate::error::ConflictError;
use crate::models::{
    CommitmentEvent, ConflictEntry, ConflictReport, ConflictSummary, DayRange, EventKind, Person,
    PersonId, ProductionId, RangeConflictReport, SourceFailure, TimeRange,
};
use crate::sources::{RosterResolver, SourceSet};

pub struct ConflictDetector {
    roster: Arc<dyn RosterResolver>,
    sources: SourceSet,
    config: DetectorConfig,
}

impl ConflictDetector {
    pub fn new(roster: Arc<dyn RosterResolver>, sources: SourceSet) -> Self {
        Self::with_config(roster, sources, DetectorConfig::default())
    }

    pub fn with_config(
        roster: Arc<dyn RosterResolver>,
        sources: SourceSet,
        config: DetectorConfig,
    ) -> Self {
        Self {
            roster,
            sources,
            config,
        }
    }

    /// Check one concrete reference window (a proposed rehearsal time)
    /// against every commitment the roster holds that day, excluding events
    /// owned by `exclude_production_id`.
    pub async fn detect_conflicts_for_event(
        &self,
        production_id: &ProductionId,
        reference: TimeRange,
        exclude_production_id: &ProductionId,
    ) -> Result<ConflictReport, ConflictError> {
        if reference.is_empty() {
            return Err(ConflictError::InvalidWindow {
                reason: format!(
                    "reference window start {} is not before end {}",
                    reference.start, reference.end
                ),
            });
        }

        let day = reference
            .start
            .with_timezone(&self.config.day_offset)
            .date_naive();
        // A window may cross venue-midnight, so the read must cover every
        // local day it touches. Over-fetching the end-boundary day is
        // harmless under the half-open predicate.
        let end_day = reference
            .end
            .with_timezone(&self.config.day_offset)
            .date_naive();

        let roster = self.resolve_roster(production_id).await?;
        if roster.is_empty() {
            debug!(production = %production_id, "Empty roster, skipping source reads");
            return Ok(ConflictReport {
                summary: ConflictSummary::empty(day),
                failed_sources: Vec::new(),
            });
        }

        let person_ids: Vec<PersonId> = roster.keys().cloned().collect();
        let (events, failed_sources) = self
            .read_all_sources(&person_ids, DayRange::new(day, end_day))
            .await?;

        let mut entries = Vec::new();
        for event in &events {
            if event.production_id.as_ref() == Some(exclude_production_id) {
                continue;
            }
            let Some(person) = roster.get(&event.person_id) else {
                debug!(person = %event.person_id, "Commitment for someone outside the roster, skipping");
                continue;
            };
            if event.time.resolve(self.config.day_offset).overlaps(&reference) {
                entries.push(conflict_entry(person, event));
            }
        }
        sort_entries(&mut entries, self.config.day_offset);

        Ok(ConflictReport {
            summary: ConflictSummary::new(day, entries),
            failed_sources,
        })
    }

    /// Per-day conflicts over an inclusive calendar-day range. The result map
    /// is sparse: days with zero conflicts are absent, and absence means "no
    /// conflicts", not "not computed".
    pub async fn detect_conflicts_for_range(
        &self,
        production_id: &ProductionId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        exclude_production_id: &ProductionId,
    ) -> Result<RangeConflictReport, ConflictError> {
        if start_date > end_date {
            return Err(ConflictError::InvalidWindow {
                reason: format!("start date {} is after end date {}", start_date, end_date),
            });
        }
        let range = DayRange::new(start_date, end_date);

        let roster = self.resolve_roster(production_id).await?;
        if roster.is_empty() {
            debug!(production = %production_id, "Empty roster, skipping source reads");
            return Ok(RangeConflictReport {
                days: BTreeMap::new(),
                failed_sources: Vec::new(),
            });
        }

        let person_ids: Vec<PersonId> = roster.keys().cloned().collect();
        let (events, failed_sources) = self.read_all_sources(&person_ids, range).await?;

        // Merge all sources into one bucket per venue-local day.
        let mut buckets: BTreeMap<NaiveDate, Vec<CommitmentEvent>> = BTreeMap::new();
        for event in events {
            if event.production_id.as_ref() == Some(exclude_production_id) {
                continue;
            }
            let day = event.time.day_key(self.config.day_offset);
            if !range.contains(day) {
                debug!(%day, source_ref = %event.source_ref, "Source returned event outside the requested range, skipping");
                continue;
            }
            buckets.entry(day).or_default().push(event);
        }

        let mut days = BTreeMap::new();
        for (day, bucket) in buckets {
            let entries = day_conflicts(&roster, &bucket, self.config.day_offset);
            if !entries.is_empty() {
                days.insert(day, ConflictSummary::new(day, entries));
            }
        }

        Ok(RangeConflictReport {
            days,
            failed_sources,
        })
    }

    async fn resolve_roster(
        &self,
        production_id: &ProductionId,
    ) -> Result<HashMap<PersonId, Person>, ConflictError> {
        let people = self
            .roster
            .resolve_roster(production_id)
            .await
            .map_err(|source| ConflictError::RosterResolution {
                production_id: production_id.clone(),
                source,
            })?;

        let mut roster = HashMap::with_capacity(people.len());
        for person in people {
            roster.entry(person.person_id.clone()).or_insert(person);
        }
        Ok(roster)
    }

    /// Fan out one batched read per source, concurrently, each under the
    /// configured timeout. Failure handling follows the configured policy;
    /// under `Partial`, a call where every source failed still errors since
    /// an empty result would hide real conflicts.
    async fn read_all_sources(
        &self,
        person_ids: &[PersonId],
        range: DayRange,
    ) -> Result<(Vec<CommitmentEvent>, Vec<SourceFailure>), ConflictError> {
        let reads = self.sources.iter().map(|source| {
            let kind = source.kind();
            let timeout = self.config.source_timeout;
            async move {
                let outcome =
                    tokio::time::timeout(timeout, source.read_events(person_ids, range)).await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!(
                        "source read timed out after {:?}",
                        timeout
                    )),
                };
                (kind, result)
            }
        });
        let outcomes = join_all(reads).await;

        let mut events = Vec::new();
        let mut failures: Vec<(EventKind, anyhow::Error)> = Vec::new();
        for (kind, result) in outcomes {
            match result {
                Ok(batch) => {
                    debug!(%kind, count = batch.len(), "Source read complete");
                    events.extend(batch);
                }
                Err(err) => {
                    if self.config.failure_policy == FailurePolicy::FailFast {
                        return Err(ConflictError::SourceQuery { kind, source: err });
                    }
                    warn!(%kind, error = %err, "Source read failed, continuing with remaining sources");
                    failures.push((kind, err));
                }
            }
        }

        if failures.len() == self.sources.len() {
            let (kind, err) = failures.remove(0);
            return Err(ConflictError::SourceQuery { kind, source: err });
        }

        let failed_sources = failures
            .into_iter()
            .map(|(kind, err)| SourceFailure {
                kind,
                message: format!("{:#}", err),
            })
            .collect();
        Ok((events, failed_sources))
    }
}

/// Within one day bucket: every event that overlaps at least one other event
/// of the same person yields one entry. Three mutually overlapping
/// commitments produce three entries, not three-choose-two pairs.
fn day_conflicts(
    roster: &HashMap<PersonId, Person>,
    bucket: &[CommitmentEvent],
    day_offset: FixedOffset,
) -> Vec<ConflictEntry> {
    let mut by_person: HashMap<&PersonId, Vec<&CommitmentEvent>> = HashMap::new();
    for event in bucket {
        by_person.entry(&event.person_id).or_default().push(event);
    }

    let mut entries = Vec::new();
    for (person_id, events) in by_person {
        let Some(person) = roster.get(person_id) else {
            debug!(person = %person_id, "Commitment for someone outside the roster, skipping");
            continue;
        };
        let ranges: Vec<TimeRange> = events.iter().map(|e| e.time.resolve(day_offset)).collect();
        for (i, event) in events.iter().enumerate() {
            let overlapping = ranges
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && ranges[i].overlaps(other));
            if overlapping {
                entries.push(conflict_entry(person, event));
            }
        }
    }

    sort_entries(&mut entries, day_offset);
    entries
}

fn conflict_entry(person: &Person, event: &CommitmentEvent) -> ConflictEntry {
    ConflictEntry {
        person: person.clone(),
        kind: event.kind,
        title: event.title.clone(),
        time: event.time,
        source_ref: event.source_ref.clone(),
    }
}

/// Deterministic output order: start instant, then person, then record.
fn sort_entries(entries: &mut [ConflictEntry], day_offset: FixedOffset) {
    entries.sort_by(|a, b| {
        let ka = (
            a.time.resolve(day_offset).start,
            &a.person.person_id,
            &a.source_ref,
        );
        let kb = (
            b.time.resolve(day_offset).start,
            &b.person.person_id,
            &b.source_ref,
        );
        ka.cmp(&kb)
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Offset, TimeZone, Utc};

    use crate::models::{EventTime, SourceRef};
    use crate::sources::EventSource;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, d).unwrap()
    }

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, d, h, m, 0).unwrap()
    }

    fn person(id: &str, name: &str) -> Person {
        Person::new(id, name)
    }

    fn timed_event(
        kind: EventKind,
        person_id: &str,
        production: Option<&str>,
        title: &str,
        d: u32,
        h1: u32,
        m1: u32,
        h2: u32,
        m2: u32,
    ) -> CommitmentEvent {
        CommitmentEvent {
            person_id: PersonId::new(person_id),
            kind,
            title: title.to_string(),
            time: EventTime::Timed {
                start: utc(d, h1, m1),
                end: utc(d, h2, m2),
            },
            production_id: production.map(ProductionId::new),
            source_ref: SourceRef::new(format!("{}:{}-{}{}", kind.label(), d, h1, m1)),
        }
    }

    fn all_day_event(person_id: &str, d: u32, title: &str) -> CommitmentEvent {
        CommitmentEvent {
            person_id: PersonId::new(person_id),
            kind: EventKind::PersonalCalendar,
            title: title.to_string(),
            time: EventTime::AllDay { date: day(d) },
            production_id: None,
            source_ref: SourceRef::new(format!("personal:{}-{}", d, title)),
        }
    }

    struct StaticRoster(Vec<Person>);

    #[async_trait]
    impl RosterResolver for StaticRoster {
        async fn resolve_roster(&self, _production_id: &ProductionId) -> anyhow::Result<Vec<Person>> {
            Ok(self.0.clone())
        }
    }

    struct FailingRoster;

    #[async_trait]
    impl RosterResolver for FailingRoster {
        async fn resolve_roster(&self, _production_id: &ProductionId) -> anyhow::Result<Vec<Person>> {
            Err(anyhow::anyhow!("session expired"))
        }
    }

    struct StaticSource {
        kind: EventKind,
        events: Vec<CommitmentEvent>,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn new(kind: EventKind, events: Vec<CommitmentEvent>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                events,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for StaticSource {
        fn kind(&self) -> EventKind {
            self.kind
        }

        async fn read_events(
            &self,
            _person_ids: &[PersonId],
            _range: DayRange,
        ) -> anyhow::Result<Vec<CommitmentEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.events.clone())
        }
    }

    struct FailingSource(EventKind);

    #[async_trait]
    impl EventSource for FailingSource {
        fn kind(&self) -> EventKind {
            self.0
        }

        async fn read_events(
            &self,
            _person_ids: &[PersonId],
            _range: DayRange,
        ) -> anyhow::Result<Vec<CommitmentEvent>> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    struct SlowSource(EventKind);

    #[async_trait]
    impl EventSource for SlowSource {
        fn kind(&self) -> EventKind {
            self.0
        }

        async fn read_events(
            &self,
            _person_ids: &[PersonId],
            _range: DayRange,
        ) -> anyhow::Result<Vec<CommitmentEvent>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    /// Behaves like a real store: only returns events whose day falls inside
    /// the requested range.
    struct RangeFilteredSource {
        kind: EventKind,
        events: Vec<CommitmentEvent>,
    }

    #[async_trait]
    impl EventSource for RangeFilteredSource {
        fn kind(&self) -> EventKind {
            self.kind
        }

        async fn read_events(
            &self,
            _person_ids: &[PersonId],
            range: DayRange,
        ) -> anyhow::Result<Vec<CommitmentEvent>> {
            Ok(self
                .events
                .iter()
                .filter(|e| range.contains(e.time.day_key(Utc.fix())))
                .cloned()
                .collect())
        }
    }

    fn filtered_set(events: Vec<CommitmentEvent>) -> SourceSet {
        let make = |kind: EventKind| -> Arc<dyn EventSource> {
            Arc::new(RangeFilteredSource {
                kind,
                events: events.iter().filter(|e| e.kind == kind).cloned().collect(),
            })
        };
        SourceSet::new(
            make(EventKind::Rehearsal),
            make(EventKind::ProductionEvent),
            make(EventKind::Callback),
            make(EventKind::Audition),
            make(EventKind::PersonalCalendar),
        )
    }

    /// Static sources for all five kinds; `events` go to the matching kind.
    fn static_set(events: Vec<CommitmentEvent>) -> (SourceSet, Vec<Arc<StaticSource>>) {
        let sources: Vec<Arc<StaticSource>> = EventKind::ALL
            .iter()
            .map(|&kind| {
                let for_kind = events
                    .iter()
                    .filter(|e| e.kind == kind)
                    .cloned()
                    .collect();
                StaticSource::new(kind, for_kind)
            })
            .collect();
        let set = SourceSet::new(
            sources[0].clone(),
            sources[1].clone(),
            sources[2].clone(),
            sources[3].clone(),
            sources[4].clone(),
        );
        (set, sources)
    }

    fn detector(people: Vec<Person>, events: Vec<CommitmentEvent>) -> ConflictDetector {
        let (set, _) = static_set(events);
        ConflictDetector::new(Arc::new(StaticRoster(people)), set)
    }

    fn prod(id: &str) -> ProductionId {
        ProductionId::new(id)
    }

    #[tokio::test]
    async fn test_event_reports_overlap_from_other_production() {
        // P has a prod-B callback 3:00-3:30 while prod-A rehearses 2:00-4:00
        let engine = detector(
            vec![person("p1", "Pat")],
            vec![timed_event(
                EventKind::Callback,
                "p1",
                Some("prod-b"),
                "The Seagull callback",
                1,
                15,
                0,
                15,
                30,
            )],
        );
        let reference = TimeRange::new(utc(1, 14, 0), utc(1, 16, 0));
        let report = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();

        assert_eq!(report.summary.date, day(1));
        assert_eq!(report.summary.total_conflicts, 1);
        assert_eq!(report.summary.conflicts[0].kind, EventKind::Callback);
        assert_eq!(report.summary.conflicts[0].title, "The Seagull callback");
        assert!(report.failed_sources.is_empty());
    }

    #[tokio::test]
    async fn test_midnight_crossing_window_sees_next_day_commitments() {
        // Rehearsal runs 23:00-01:00; P has a 00:30 callback after midnight.
        // The source only answers for the days it was asked about, so the
        // read must cover both days the window touches.
        let callback = timed_event(
            EventKind::Callback,
            "p1",
            Some("prod-b"),
            "The Seagull callback",
            2,
            0,
            30,
            1,
            0,
        );
        let reference = TimeRange::new(utc(1, 23, 0), utc(2, 1, 0));
        assert!(callback.time.resolve(Utc.fix()).overlaps(&reference));

        let engine = ConflictDetector::new(
            Arc::new(StaticRoster(vec![person("p1", "Pat")])),
            filtered_set(vec![callback]),
        );
        let report = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();

        assert_eq!(report.summary.date, day(1));
        assert_eq!(report.summary.total_conflicts, 1);
        assert_eq!(report.summary.conflicts[0].kind, EventKind::Callback);
    }

    #[tokio::test]
    async fn test_own_production_is_excluded() {
        let engine = detector(
            vec![person("p1", "Pat")],
            vec![timed_event(
                EventKind::Callback,
                "p1",
                Some("prod-a"),
                "own callback",
                1,
                15,
                0,
                15,
                30,
            )],
        );
        let reference = TimeRange::new(utc(1, 14, 0), utc(1, 16, 0));
        let report = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();
        assert!(report.summary.is_empty());
    }

    #[tokio::test]
    async fn test_all_day_personal_entry_conflicts_with_timed_window() {
        let engine = detector(
            vec![person("p1", "Pat")],
            vec![all_day_event("p1", 1, "Day job")],
        );
        // 10AM-11AM audition slot on the same day
        let reference = TimeRange::new(utc(1, 10, 0), utc(1, 11, 0));
        let report = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();
        assert_eq!(report.summary.total_conflicts, 1);
        assert_eq!(
            report.summary.conflicts[0].kind,
            EventKind::PersonalCalendar
        );
    }

    #[tokio::test]
    async fn test_zero_duration_commitment_never_conflicts() {
        let engine = detector(
            vec![person("p1", "Pat")],
            vec![timed_event(
                EventKind::Audition,
                "p1",
                Some("prod-b"),
                "zero slot",
                1,
                15,
                0,
                15,
                0,
            )],
        );
        let reference = TimeRange::new(utc(1, 14, 0), utc(1, 16, 0));
        let report = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();
        assert!(report.summary.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_reference_window_rejected() {
        let engine = detector(vec![person("p1", "Pat")], Vec::new());
        let backwards = TimeRange::new(utc(1, 16, 0), utc(1, 14, 0));
        let err = engine
            .detect_conflicts_for_event(&prod("prod-a"), backwards, &prod("prod-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::InvalidWindow { .. }));

        let err = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(30), day(1), &prod("prod-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::InvalidWindow { .. }));
    }

    #[tokio::test]
    async fn test_empty_roster_is_success_and_skips_source_reads() {
        let (set, sources) = static_set(Vec::new());
        let engine = ConflictDetector::new(Arc::new(StaticRoster(Vec::new())), set);
        let reference = TimeRange::new(utc(1, 14, 0), utc(1, 16, 0));
        let report = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();
        assert!(report.summary.is_empty());
        for source in &sources {
            assert_eq!(source.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_roster_failure_propagates() {
        let (set, _) = static_set(Vec::new());
        let engine = ConflictDetector::new(Arc::new(FailingRoster), set);
        let err = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(30), &prod("prod-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::RosterResolution { .. }));
    }

    #[tokio::test]
    async fn test_range_map_is_sparse() {
        // 30-day range; only day 15 has an actual overlap. Day 3 holds a lone
        // commitment and two people hold non-overlapping ones on day 20.
        let events = vec![
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 3, 10, 0, 12, 0),
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 15, 14, 0, 16, 0),
            timed_event(EventKind::Callback, "p1", Some("prod-c"), "cb", 15, 15, 0, 15, 30),
            timed_event(EventKind::Audition, "p1", Some("prod-b"), "a", 20, 9, 0, 10, 0),
            timed_event(EventKind::Audition, "p2", Some("prod-b"), "a", 20, 9, 0, 10, 0),
        ];
        let engine = detector(vec![person("p1", "Pat"), person("p2", "Sam")], events);
        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(30), &prod("prod-a"))
            .await
            .unwrap();

        assert_eq!(report.days.len(), 1);
        let summary = report.days.get(&day(15)).unwrap();
        assert_eq!(summary.total_conflicts, 2);
        assert_eq!(summary.total_conflicts, summary.conflicts.len());
    }

    #[tokio::test]
    async fn test_three_mutual_overlaps_yield_three_entries() {
        let events = vec![
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 1, 14, 0, 17, 0),
            timed_event(EventKind::Callback, "p1", Some("prod-c"), "cb", 1, 15, 0, 16, 0),
            timed_event(EventKind::Audition, "p1", Some("prod-d"), "a", 1, 15, 30, 18, 0),
        ];
        let engine = detector(vec![person("p1", "Pat")], events);
        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap();
        assert_eq!(report.days.get(&day(1)).unwrap().total_conflicts, 3);
    }

    #[tokio::test]
    async fn test_identical_ranges_both_reported() {
        let events = vec![
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 1, 14, 0, 16, 0),
            timed_event(EventKind::Callback, "p1", Some("prod-c"), "cb", 1, 14, 0, 16, 0),
        ];
        let engine = detector(vec![person("p1", "Pat")], events);
        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap();
        assert_eq!(report.days.get(&day(1)).unwrap().total_conflicts, 2);
    }

    #[tokio::test]
    async fn test_all_day_entries_stack() {
        let events = vec![
            all_day_event("p1", 1, "Day job"),
            all_day_event("p1", 1, "Family visit"),
            timed_event(EventKind::Audition, "p1", Some("prod-b"), "a", 1, 10, 0, 11, 0),
        ];
        let engine = detector(vec![person("p1", "Pat")], events);
        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap();
        // Both all-day entries and the timed slot all mutually overlap
        assert_eq!(report.days.get(&day(1)).unwrap().total_conflicts, 3);
    }

    #[tokio::test]
    async fn test_overlaps_across_people_are_not_conflicts() {
        let events = vec![
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 1, 14, 0, 16, 0),
            timed_event(EventKind::Callback, "p2", Some("prod-c"), "cb", 1, 14, 0, 16, 0),
        ];
        let engine = detector(vec![person("p1", "Pat"), person("p2", "Sam")], events);
        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap();
        assert!(report.days.is_empty());
    }

    #[tokio::test]
    async fn test_partial_policy_keeps_healthy_sources() {
        let conflicting = vec![
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 1, 14, 0, 16, 0),
            timed_event(EventKind::Callback, "p1", Some("prod-c"), "cb", 1, 15, 0, 16, 0),
        ];
        let (_, sources) = static_set(conflicting);
        let set = SourceSet::new(
            sources[0].clone(),
            sources[1].clone(),
            sources[2].clone(),
            sources[3].clone(),
            Arc::new(FailingSource(EventKind::PersonalCalendar)),
        );
        let engine = ConflictDetector::new(Arc::new(StaticRoster(vec![person("p1", "Pat")])), set);

        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap();
        assert_eq!(report.failed_sources.len(), 1);
        assert_eq!(report.failed_sources[0].kind, EventKind::PersonalCalendar);
        assert_eq!(report.days.get(&day(1)).unwrap().total_conflicts, 2);
    }

    #[tokio::test]
    async fn test_partial_policy_reports_failure_on_event_path() {
        // Same policy on both query paths: the single-event check also keeps
        // healthy sources and records the failed one
        let (_, sources) = static_set(vec![timed_event(
            EventKind::Callback,
            "p1",
            Some("prod-b"),
            "cb",
            1,
            15,
            0,
            15,
            30,
        )]);
        let set = SourceSet::new(
            sources[0].clone(),
            sources[1].clone(),
            sources[2].clone(),
            sources[3].clone(),
            Arc::new(FailingSource(EventKind::PersonalCalendar)),
        );
        let engine = ConflictDetector::new(Arc::new(StaticRoster(vec![person("p1", "Pat")])), set);

        let reference = TimeRange::new(utc(1, 14, 0), utc(1, 16, 0));
        let report = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();
        assert_eq!(report.failed_sources.len(), 1);
        assert_eq!(report.failed_sources[0].kind, EventKind::PersonalCalendar);
        assert_eq!(report.summary.total_conflicts, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_policy_surfaces_source_error() {
        let (_, sources) = static_set(Vec::new());
        let set = SourceSet::new(
            sources[0].clone(),
            sources[1].clone(),
            sources[2].clone(),
            Arc::new(FailingSource(EventKind::Audition)),
            sources[4].clone(),
        );
        let config = DetectorConfig {
            failure_policy: FailurePolicy::FailFast,
            ..DetectorConfig::default()
        };
        let engine = ConflictDetector::with_config(
            Arc::new(StaticRoster(vec![person("p1", "Pat")])),
            set,
            config,
        );

        let err = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap_err();
        match err {
            ConflictError::SourceQuery { kind, .. } => assert_eq!(kind, EventKind::Audition),
            other => panic!("expected SourceQuery, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_sources_failing_errors_even_under_partial() {
        let set = SourceSet::new(
            Arc::new(FailingSource(EventKind::Rehearsal)),
            Arc::new(FailingSource(EventKind::ProductionEvent)),
            Arc::new(FailingSource(EventKind::Callback)),
            Arc::new(FailingSource(EventKind::Audition)),
            Arc::new(FailingSource(EventKind::PersonalCalendar)),
        );
        let engine = ConflictDetector::new(Arc::new(StaticRoster(vec![person("p1", "Pat")])), set);
        let err = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::SourceQuery { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out_as_failure() {
        let (_, sources) = static_set(Vec::new());
        let set = SourceSet::new(
            sources[0].clone(),
            sources[1].clone(),
            sources[2].clone(),
            sources[3].clone(),
            Arc::new(SlowSource(EventKind::PersonalCalendar)),
        );
        let engine = ConflictDetector::new(Arc::new(StaticRoster(vec![person("p1", "Pat")])), set);

        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap();
        assert_eq!(report.failed_sources.len(), 1);
        assert_eq!(report.failed_sources[0].kind, EventKind::PersonalCalendar);
        assert!(report.failed_sources[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_repeated_calls_are_idempotent() {
        let events = vec![
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 1, 14, 0, 16, 0),
            timed_event(EventKind::Callback, "p1", Some("prod-c"), "cb", 1, 15, 0, 16, 0),
        ];
        let engine = detector(vec![person("p1", "Pat")], events);
        let reference = TimeRange::new(utc(1, 14, 30), utc(1, 15, 30));

        let first = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();
        let second = engine
            .detect_conflicts_for_event(&prod("prod-a"), reference, &prod("prod-a"))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_range_query_issues_one_read_per_source() {
        let events = vec![
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 15, 14, 0, 16, 0),
            timed_event(EventKind::Callback, "p2", Some("prod-c"), "cb", 15, 15, 0, 16, 0),
        ];
        let (set, sources) = static_set(events);
        let roster = vec![person("p1", "Pat"), person("p2", "Sam"), person("p3", "Kim")];
        let engine = ConflictDetector::new(Arc::new(StaticRoster(roster)), set);

        engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(30), &prod("prod-a"))
            .await
            .unwrap();
        // 3 people x 30 days, still exactly one read per source
        for source in &sources {
            assert_eq!(source.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_entries_sorted_by_start_then_person() {
        let events = vec![
            timed_event(EventKind::Callback, "p2", Some("prod-c"), "late", 1, 15, 0, 16, 0),
            timed_event(EventKind::Rehearsal, "p2", Some("prod-b"), "early", 1, 9, 0, 16, 0),
            timed_event(EventKind::Audition, "p1", Some("prod-d"), "mid", 1, 9, 0, 10, 0),
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "mid2", 1, 9, 30, 10, 30),
        ];
        let engine = detector(vec![person("p1", "Pat"), person("p2", "Sam")], events);
        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap();
        let titles: Vec<&str> = report
            .days
            .get(&day(1))
            .unwrap()
            .conflicts
            .iter()
            .map(|c| c.title.as_str())
            .collect();
        assert_eq!(titles, vec!["mid", "early", "mid2", "late"]);
    }

    #[tokio::test]
    async fn test_duplicate_roster_entries_deduped() {
        let events = vec![
            timed_event(EventKind::Rehearsal, "p1", Some("prod-b"), "r", 1, 14, 0, 16, 0),
            timed_event(EventKind::Callback, "p1", Some("prod-c"), "cb", 1, 15, 0, 16, 0),
        ];
        // p1 appears both as cast and as crew
        let engine = detector(vec![person("p1", "Pat"), person("p1", "Pat")], events);
        let report = engine
            .detect_conflicts_for_range(&prod("prod-a"), day(1), day(1), &prod("prod-a"))
            .await
            .unwrap();
        assert_eq!(report.days.get(&day(1)).unwrap().total_conflicts, 2);
    }
}
