//! Error kinds surfaced by the tier-list engine.
//!
//! None of these is fatal to a session: local state keeps working and only
//! remote persistence may lag behind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TierListError {
    /// Catalog store unreachable; the caller shows an error state, no retry loop.
    #[error("Failed to fetch catalog: {0}")]
    CatalogFetch(#[source] anyhow::Error),

    /// Fingerprinting or the remote identity lookup failed.
    #[error("Could not resolve visitor identity: {0}")]
    IdentityResolution(String),

    /// Identity record could not be created; local edits are kept.
    #[error("Failed to create identity: {0}")]
    IdentityCreation(#[source] anyhow::Error),

    /// Single-change or whole-list upsert failed; local state stays authoritative.
    #[error("Sync failed, changes are saved locally only: {0}")]
    Sync(#[source] anyhow::Error),

    /// Server-side majority routine missing or erroring. Never shown to users.
    #[error("Aggregation routine unavailable: {0}")]
    AggregationRoutineUnavailable(#[source] anyhow::Error),

    /// Routine and raw-row fallback both failed.
    #[error("Failed to aggregate submissions: {0}")]
    Aggregation(#[source] anyhow::Error),

    /// Local session file could not be read or written.
    #[error("Session storage error: {0}")]
    Session(#[source] anyhow::Error),
}

impl TierListError {
    /// Whether this error should be shown to the visitor as a warning banner
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, TierListError::AggregationRoutineUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, TierListError>;
