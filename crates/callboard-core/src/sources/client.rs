//! HTTP adapters for the production scheduling API.
//!
//! `ApiClient` handles transport concerns (auth header, timeouts, rate-limit
//! backoff); one thin adapter per calendar source maps its native wire rows
//! into `CommitmentEvent` right here at the boundary, so the engine never
//! sees source-specific fields.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    CommitmentEvent, DayRange, EventKind, EventTime, Person, PersonId, ProductionId, SourceRef,
};

use super::error::ApiError;
use super::{EventSource, RosterResolver};

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the scheduling API
const DEFAULT_BASE_URL: &str = "https://api.callboard.app/v1";

/// HTTP request timeout in seconds.
/// Conflict checks are advisory UI decoration, so fail fast.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 500;

/// API client for the scheduling backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against the default backend
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
        })
    }

    /// Override the backend base URL (staging, local dev)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit
    /// (should retry), or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            // Rate limited - signal to retry
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.auth_headers()?)
                .send()
                .await
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .post(url)
                .headers(self.auth_headers()?)
                .json(body)
                .send()
                .await
                .with_context(|| format!("Failed to send POST request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Body for the batched search endpoints: everyone on the roster, the whole
/// requested day range, one request per source.
#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    #[serde(rename = "personIds")]
    person_ids: &'a [PersonId],
    #[serde(rename = "startDate")]
    start_date: NaiveDate,
    #[serde(rename = "endDate")]
    end_date: NaiveDate,
}

impl<'a> SearchBody<'a> {
    fn new(person_ids: &'a [PersonId], range: DayRange) -> Self {
        Self {
            person_ids,
            start_date: range.start,
            end_date: range.end,
        }
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn timed(starts_at: &str, ends_at: &str) -> Option<EventTime> {
    Some(EventTime::Timed {
        start: parse_instant(starts_at)?,
        end: parse_instant(ends_at)?,
    })
}

/// Collect mapped rows, counting (not failing on) the ones the backend sent
/// with unparseable times.
fn collect_rows(
    kind: EventKind,
    rows: impl Iterator<Item = Option<CommitmentEvent>>,
) -> Vec<CommitmentEvent> {
    let mut events = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        match row {
            Some(event) => events.push(event),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(%kind, skipped, "Skipped rows with malformed timestamps");
    }
    debug!(%kind, count = events.len(), "Mapped source rows");
    events
}

#[derive(Debug, Clone, Deserialize)]
struct RehearsalRow {
    id: i64,
    #[serde(rename = "productionId")]
    production_id: String,
    #[serde(rename = "productionName")]
    production_name: Option<String>,
    #[serde(rename = "personId")]
    person_id: String,
    #[serde(rename = "startsAt")]
    starts_at: String,
    #[serde(rename = "endsAt")]
    ends_at: String,
}

impl RehearsalRow {
    fn to_commitment(&self) -> Option<CommitmentEvent> {
        let title = match self.production_name.as_deref() {
            Some(name) => format!("{} rehearsal", name),
            None => "Rehearsal".to_string(),
        };
        Some(CommitmentEvent {
            person_id: PersonId::new(&self.person_id),
            kind: EventKind::Rehearsal,
            title,
            time: timed(&self.starts_at, &self.ends_at)?,
            production_id: Some(ProductionId::new(&self.production_id)),
            source_ref: SourceRef::new(format!("rehearsal:{}", self.id)),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ProductionEventRow {
    id: i64,
    #[serde(rename = "productionId")]
    production_id: String,
    title: Option<String>,
    #[serde(rename = "productionName")]
    production_name: Option<String>,
    #[serde(rename = "personId")]
    person_id: String,
    #[serde(rename = "startsAt")]
    starts_at: String,
    #[serde(rename = "endsAt")]
    ends_at: String,
}

impl ProductionEventRow {
    fn to_commitment(&self) -> Option<CommitmentEvent> {
        // Fittings, photo calls, production meetings: the row carries its own
        // title; fall back to the show name
        let title = self
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.production_name.clone())
            .unwrap_or_else(|| "Production event".to_string());
        Some(CommitmentEvent {
            person_id: PersonId::new(&self.person_id),
            kind: EventKind::ProductionEvent,
            title,
            time: timed(&self.starts_at, &self.ends_at)?,
            production_id: Some(ProductionId::new(&self.production_id)),
            source_ref: SourceRef::new(format!("production_event:{}", self.id)),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CallbackRow {
    id: i64,
    #[serde(rename = "productionId")]
    production_id: String,
    #[serde(rename = "productionName")]
    production_name: Option<String>,
    #[serde(rename = "personId")]
    person_id: String,
    #[serde(rename = "startsAt")]
    starts_at: String,
    #[serde(rename = "endsAt")]
    ends_at: String,
}

impl CallbackRow {
    fn to_commitment(&self) -> Option<CommitmentEvent> {
        let title = match self.production_name.as_deref() {
            Some(name) => format!("{} callback", name),
            None => "Callback".to_string(),
        };
        Some(CommitmentEvent {
            person_id: PersonId::new(&self.person_id),
            kind: EventKind::Callback,
            title,
            time: timed(&self.starts_at, &self.ends_at)?,
            production_id: Some(ProductionId::new(&self.production_id)),
            source_ref: SourceRef::new(format!("callback:{}", self.id)),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AuditionRow {
    id: i64,
    #[serde(rename = "productionId")]
    production_id: String,
    #[serde(rename = "productionName")]
    production_name: Option<String>,
    #[serde(rename = "personId")]
    person_id: String,
    // Audition signups are slot-based
    #[serde(rename = "slotStartsAt")]
    slot_starts_at: String,
    #[serde(rename = "slotEndsAt")]
    slot_ends_at: String,
}

impl AuditionRow {
    fn to_commitment(&self) -> Option<CommitmentEvent> {
        let title = match self.production_name.as_deref() {
            Some(name) => format!("{} audition", name),
            None => "Audition".to_string(),
        };
        Some(CommitmentEvent {
            person_id: PersonId::new(&self.person_id),
            kind: EventKind::Audition,
            title,
            time: timed(&self.slot_starts_at, &self.slot_ends_at)?,
            production_id: Some(ProductionId::new(&self.production_id)),
            source_ref: SourceRef::new(format!("audition:{}", self.id)),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PersonalEntryRow {
    id: i64,
    #[serde(rename = "personId")]
    person_id: String,
    title: Option<String>,
    #[serde(rename = "allDay", default)]
    all_day: bool,
    /// Present for all-day entries, "YYYY-MM-DD"
    date: Option<String>,
    #[serde(rename = "startsAt")]
    starts_at: Option<String>,
    #[serde(rename = "endsAt")]
    ends_at: Option<String>,
}

impl PersonalEntryRow {
    fn to_commitment(&self) -> Option<CommitmentEvent> {
        let time = if self.all_day {
            let date =
                NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
            EventTime::AllDay { date }
        } else {
            timed(self.starts_at.as_deref()?, self.ends_at.as_deref()?)?
        };
        Some(CommitmentEvent {
            person_id: PersonId::new(&self.person_id),
            kind: EventKind::PersonalCalendar,
            title: self
                .title
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Personal commitment".to_string()),
            time,
            production_id: None,
            source_ref: SourceRef::new(format!("personal:{}", self.id)),
        })
    }
}

// ============================================================================
// Event sources
// ============================================================================

pub struct RehearsalSource {
    api: ApiClient,
}

impl RehearsalSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventSource for RehearsalSource {
    fn kind(&self) -> EventKind {
        EventKind::Rehearsal
    }

    async fn read_events(
        &self,
        person_ids: &[PersonId],
        range: DayRange,
    ) -> Result<Vec<CommitmentEvent>> {
        let url = format!("{}/rehearsals/search", self.api.base_url());
        let rows: Vec<RehearsalRow> = self
            .api
            .post(&url, &SearchBody::new(person_ids, range))
            .await?;
        Ok(collect_rows(
            self.kind(),
            rows.iter().map(RehearsalRow::to_commitment),
        ))
    }
}

pub struct ProductionEventSource {
    api: ApiClient,
}

impl ProductionEventSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventSource for ProductionEventSource {
    fn kind(&self) -> EventKind {
        EventKind::ProductionEvent
    }

    async fn read_events(
        &self,
        person_ids: &[PersonId],
        range: DayRange,
    ) -> Result<Vec<CommitmentEvent>> {
        let url = format!("{}/production-events/search", self.api.base_url());
        let rows: Vec<ProductionEventRow> = self
            .api
            .post(&url, &SearchBody::new(person_ids, range))
            .await?;
        Ok(collect_rows(
            self.kind(),
            rows.iter().map(ProductionEventRow::to_commitment),
        ))
    }
}

pub struct CallbackSource {
    api: ApiClient,
}

impl CallbackSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventSource for CallbackSource {
    fn kind(&self) -> EventKind {
        EventKind::Callback
    }

    async fn read_events(
        &self,
        person_ids: &[PersonId],
        range: DayRange,
    ) -> Result<Vec<CommitmentEvent>> {
        let url = format!("{}/callbacks/search", self.api.base_url());
        let rows: Vec<CallbackRow> = self
            .api
            .post(&url, &SearchBody::new(person_ids, range))
            .await?;
        Ok(collect_rows(
            self.kind(),
            rows.iter().map(CallbackRow::to_commitment),
        ))
    }
}

pub struct AuditionSource {
    api: ApiClient,
}

impl AuditionSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventSource for AuditionSource {
    fn kind(&self) -> EventKind {
        EventKind::Audition
    }

    async fn read_events(
        &self,
        person_ids: &[PersonId],
        range: DayRange,
    ) -> Result<Vec<CommitmentEvent>> {
        let url = format!("{}/audition-signups/search", self.api.base_url());
        let rows: Vec<AuditionRow> = self
            .api
            .post(&url, &SearchBody::new(person_ids, range))
            .await?;
        Ok(collect_rows(
            self.kind(),
            rows.iter().map(AuditionRow::to_commitment),
        ))
    }
}

pub struct PersonalCalendarSource {
    api: ApiClient,
}

impl PersonalCalendarSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventSource for PersonalCalendarSource {
    fn kind(&self) -> EventKind {
        EventKind::PersonalCalendar
    }

    async fn read_events(
        &self,
        person_ids: &[PersonId],
        range: DayRange,
    ) -> Result<Vec<CommitmentEvent>> {
        let url = format!("{}/calendar-entries/search", self.api.base_url());
        let rows: Vec<PersonalEntryRow> = self
            .api
            .post(&url, &SearchBody::new(person_ids, range))
            .await?;
        Ok(collect_rows(
            self.kind(),
            rows.iter().map(PersonalEntryRow::to_commitment),
        ))
    }
}

// ============================================================================
// Roster
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct MemberRow {
    #[serde(rename = "personId")]
    person_id: String,
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "photoUrl")]
    photo_url: Option<String>,
}

impl MemberRow {
    fn into_person(self) -> Person {
        Person {
            person_id: PersonId::new(self.person_id),
            display_name: self.display_name,
            photo_url: self.photo_url,
        }
    }
}

/// Resolves a production's roster from the team and cast endpoints.
pub struct HttpRosterResolver {
    api: ApiClient,
}

impl HttpRosterResolver {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RosterResolver for HttpRosterResolver {
    async fn resolve_roster(&self, production_id: &ProductionId) -> Result<Vec<Person>> {
        let team_url = format!("{}/productions/{}/team", self.api.base_url(), production_id);
        let cast_url = format!("{}/productions/{}/cast", self.api.base_url(), production_id);

        let (team, cast): (Vec<MemberRow>, Vec<MemberRow>) = futures::future::try_join(
            self.api.get(&team_url),
            self.api.get(&cast_url),
        )
        .await
        .context("Failed to fetch production roster")?;

        debug!(
            production = %production_id,
            team = team.len(),
            cast = cast.len(),
            "Resolved roster"
        );

        Ok(team
            .into_iter()
            .chain(cast)
            .map(MemberRow::into_person)
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
