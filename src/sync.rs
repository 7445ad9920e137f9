// 🔄 Sync Protocol - Pushes single tier changes to the store
//
// One diff in, one upsert out. The identity is created lazily on the first
// move, an identical (identity, unit, tier) repeated inside the dedup window
// is dropped, and the store row is overwritten in place (last write wins).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assignment::{AssignmentState, TierDiff};
use crate::db::{TierStore, UpsertOutcome};
use crate::entities::RankableUnit;
use crate::error::{Result, TierListError};
use crate::identity::{Fingerprinter, IdentityId, IdentityResolver, SessionContext};
use crate::tier::Tier;

pub const DEFAULT_DEDUP_WINDOW_MS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    Inserted,
    Updated,

    /// Identical change already synced inside the dedup window
    Duplicate,
}

impl From<UpsertOutcome> for SyncOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted => SyncOutcome::Inserted,
            UpsertOutcome::Updated => SyncOutcome::Updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SyncedChange {
    identity: IdentityId,
    unit: RankableUnit,
    tier: Tier,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SyncProtocol {
    dedup_window: Duration,
    last_success: Option<SyncedChange>,
}

impl Default for SyncProtocol {
    fn default() -> Self {
        SyncProtocol::new(Duration::milliseconds(DEFAULT_DEDUP_WINDOW_MS))
    }
}

impl SyncProtocol {
    pub fn new(dedup_window: Duration) -> Self {
        SyncProtocol {
            dedup_window,
            last_success: None,
        }
    }

    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    pub fn submit_single_change<S: TierStore, F: Fingerprinter>(
        &mut self,
        store: &S,
        resolver: &IdentityResolver<F>,
        session: &mut SessionContext,
        diff: &TierDiff,
    ) -> Result<SyncOutcome> {
        self.submit_single_change_at(store, resolver, session, diff, Utc::now())
    }

    /// Same as `submit_single_change` with an explicit clock
    pub fn submit_single_change_at<S: TierStore, F: Fingerprinter>(
        &mut self,
        store: &S,
        resolver: &IdentityResolver<F>,
        session: &mut SessionContext,
        diff: &TierDiff,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        let identity = resolver.ensure_identity(session, store)?;

        if self.is_duplicate(&identity, diff, now) {
            debug!(unit = %diff.unit, tier = diff.to.code(), "duplicate change inside dedup window, skipped");
            return Ok(SyncOutcome::Duplicate);
        }

        let outcome = store
            .upsert_single_assignment(&identity, &diff.unit, diff.to)
            .map_err(TierListError::Sync)?;

        // Only successful syncs arm the guard
        self.last_success = Some(SyncedChange {
            identity: identity.clone(),
            unit: diff.unit,
            tier: diff.to,
            at: now,
        });
        session.mark_submitted();

        info!(
            identity = %identity,
            unit = %diff.unit,
            from = diff.from.code(),
            to = diff.to.code(),
            ?outcome,
            "tier change synced"
        );
        Ok(outcome.into())
    }

    fn is_duplicate(&self, identity: &IdentityId, diff: &TierDiff, now: DateTime<Utc>) -> bool {
        match &self.last_success {
            Some(last) => {
                last.identity == *identity
                    && last.unit == diff.unit
                    && last.tier == diff.to
                    && now - last.at < self.dedup_window
            }
            None => false,
        }
    }

    /// Replace the visitor's whole stored submission with the current state.
    ///
    /// Tries the transactional replace first, then falls back to clearing
    /// the rows and upserting each placement. Returns the number of rows written.
    pub fn submit_tier_list<S: TierStore, F: Fingerprinter>(
        &mut self,
        store: &S,
        resolver: &IdentityResolver<F>,
        session: &mut SessionContext,
        state: &AssignmentState,
    ) -> Result<usize> {
        let identity = resolver.ensure_identity(session, store)?;
        let assignments = state.assignments();

        if let Err(e) = store.replace_submission(&identity, &assignments) {
            warn!(error = %e, "transactional replace failed, falling back to row-by-row");

            store
                .clear_submission(&identity)
                .map_err(TierListError::Sync)?;
            for (unit, tier) in &assignments {
                store
                    .upsert_single_assignment(&identity, unit, *tier)
                    .map_err(TierListError::Sync)?;
            }
        }

        session.mark_submitted();
        info!(identity = %identity, rows = assignments.len(), "tier list submitted");
        Ok(assignments.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================
