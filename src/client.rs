// 🧭 Tier List Client - One visitor's session end to end
//
// load:  catalog -> identity -> prior submission -> assignment state
// move:  local move first, then single-change sync; sync failures only warn
// read:  consensus + summary from the aggregation engine

use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregation::{AggregateResult, AggregationEngine, SummaryStats};
use crate::assignment::{AssignmentState, MoveRejected, TierDiff};
use crate::catalog::Catalog;
use crate::db::TierStore;
use crate::drop_target::{resolve_drop, DropContainer, Point, Rect};
use crate::entities::RankableUnit;
use crate::error::{Result, TierListError};
use crate::identity::{Fingerprinter, IdentityResolver, Resolution, SessionContext};
use crate::sync::{SyncOutcome, SyncProtocol};
use crate::tier::Tier;

/// What happened to a local move remotely
#[derive(Debug)]
pub struct SyncReport {
    pub diff: TierDiff,
    pub outcome: Option<SyncOutcome>,

    /// Non-fatal: the move stands locally, the store may be stale
    pub warning: Option<TierListError>,
}

impl SyncReport {
    pub fn is_synced(&self) -> bool {
        self.warning.is_none()
    }
}

pub struct TierListClient<S: TierStore, F: Fingerprinter> {
    store: S,
    resolver: IdentityResolver<F>,
    session: SessionContext,
    sync: SyncProtocol,
    state: AssignmentState,
    returning_visitor: bool,
}

impl<S: TierStore, F: Fingerprinter> TierListClient<S, F> {
    /// Fetch the catalog, resolve the visitor and restore any prior submission.
    /// Only a catalog failure is fatal.
    pub fn load(
        store: S,
        resolver: IdentityResolver<F>,
        mut session: SessionContext,
        sync: SyncProtocol,
    ) -> Result<Self> {
        let catalog = Arc::new(store.fetch_catalog().map_err(TierListError::CatalogFetch)?);

        let returning_visitor = resolver
            .has_prior_submission(&session, &store)
            .unwrap_or_else(|e| {
                warn!(error = %e, "prior submission check failed");
                false
            });

        let resolution = resolver.resolve(&mut session, &store).unwrap_or_else(|e| {
            warn!(error = %e, "treating visitor as unknown");
            Resolution::Unknown
        });

        let stored = match resolution.identity_id() {
            Some(id) => match store.fetch_submission(id) {
                Ok(rows) => rows.unwrap_or_default(),
                Err(e) => {
                    warn!(identity = %id, error = %e, "could not load prior submission");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let state = AssignmentState::initialize(catalog, &stored);
        info!(
            units = state.total_units(),
            restored = stored.len(),
            returning_visitor,
            "tier list loaded"
        );

        Ok(TierListClient {
            store,
            resolver,
            session,
            sync,
            state,
            returning_visitor,
        })
    }

    /// Move locally, then sync the diff
    pub fn move_to(&mut self, unit: RankableUnit, to: Tier) -> std::result::Result<SyncReport, MoveRejected> {
        let diff = self.state.move_to(unit, to)?;
        Ok(self.sync_diff(diff))
    }

    /// Resolve the drop target from geometry and move there.
    /// `Ok(None)` when the drop hit no tier.
    pub fn drop_unit(
        &mut self,
        unit: RankableUnit,
        dragged: &Rect,
        pointer: Point,
        containers: &[DropContainer],
    ) -> std::result::Result<Option<SyncReport>, MoveRejected> {
        match resolve_drop(dragged, pointer, containers) {
            Some(tier) => self.move_to(unit, tier).map(Some),
            None => Ok(None),
        }
    }

    fn sync_diff(&mut self, diff: TierDiff) -> SyncReport {
        match self
            .sync
            .submit_single_change(&self.store, &self.resolver, &mut self.session, &diff)
        {
            Ok(outcome) => SyncReport {
                diff,
                outcome: Some(outcome),
                warning: None,
            },
            Err(e) => {
                warn!(unit = %diff.unit, error = %e, "move kept locally");
                SyncReport {
                    diff,
                    outcome: None,
                    warning: Some(e),
                }
            }
        }
    }

    /// Push the whole current list in one go
    pub fn submit_all(&mut self) -> Result<usize> {
        self.sync
            .submit_tier_list(&self.store, &self.resolver, &mut self.session, &self.state)
    }

    pub fn consensus(&self) -> Result<AggregateResult> {
        AggregationEngine::compute(&self.store, self.state.catalog())
    }

    pub fn summary(&self) -> Result<SummaryStats> {
        let result = self.consensus()?;
        let total = self
            .store
            .count_identities()
            .map_err(TierListError::Aggregation)?;
        Ok(SummaryStats::from_result(&result, total))
    }

    pub fn state(&self) -> &AssignmentState {
        &self.state
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.state.catalog()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_returning_visitor(&self) -> bool {
        self.returning_visitor
    }
}
