//! Engine configuration.
//!
//! A detector is cheap to build per deployment; the config answers the two
//! policy questions the engine refuses to guess at: what a calendar day is
//! (venue UTC offset) and what happens when a source read fails.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

/// Per-source read budget. A slow source becomes a recorded failure for that
/// source only instead of stalling the whole fan-out.
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 5;

/// What to do when one of the five source reads fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Keep conflicts from the sources that succeeded and record the rest in
    /// `failed_sources`. A missing source must not hide real conflicts from
    /// the other four. Applied uniformly to both query paths.
    #[default]
    Partial,
    /// Surface the first source error and discard everything else.
    FailFast,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub source_timeout: Duration,
    pub failure_policy: FailurePolicy,
    /// UTC offset that defines the calendar day: all-day expansion and day
    /// bucketing both use venue-local midnight, never a mix of UTC and local
    /// arithmetic.
    pub day_offset: FixedOffset,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS),
            failure_policy: FailurePolicy::default(),
            day_offset: Utc.fix(),
        }
    }
}
