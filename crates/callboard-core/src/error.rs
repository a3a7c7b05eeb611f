use thiserror::Error;

use crate::models::{EventKind, ProductionId};

/// Failures surfaced by the conflict engine. Conflict detection is advisory:
/// callers should degrade (e.g. render the calendar without badges) rather
/// than block the scheduling action on any of these.
#[derive(Error, Debug)]
pub enum ConflictError {
    /// The roster lookup failed. Always fails the whole call; the engine
    /// never retries it.
    #[error("failed to resolve roster for production {production_id}")]
    RosterResolution {
        production_id: ProductionId,
        #[source]
        source: anyhow::Error,
    },

    /// A source read failed under the fail-fast policy, or every source
    /// failed under the partial-results policy.
    #[error("{kind} source query failed")]
    SourceQuery {
        kind: EventKind,
        #[source]
        source: anyhow::Error,
    },

    /// The caller passed a backwards reference window or date range.
    #[error("invalid window: {reason}")]
    InvalidWindow { reason: String },
}
