// 🗂️ Assignment State - One visitor's in-memory tier list
//
// Flat unit -> tier index plus per-tier ordered lists for rendering.
// Invariant: every catalog unit sits in exactly one tier (UNRANKED included).
// `move_unit` is the only mutation and moves exactly one unit per call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::db::TierAssignment;
use crate::entities::RankableUnit;
use crate::tier::Tier;

/// The minimal description of one unit's tier change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDiff {
    pub unit: RankableUnit,
    pub from: Tier,
    pub to: Tier,
}

/// Why a move was a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejected {
    ReadOnly,
    SameTier,
    NotInSourceTier,
}

impl fmt::Display for MoveRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            MoveRejected::ReadOnly => "tier list is read-only",
            MoveRejected::SameTier => "unit is already in that tier",
            MoveRejected::NotInSourceTier => "unit is not in the source tier",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone)]
pub struct AssignmentState {
    catalog: Arc<Catalog>,
    index: HashMap<RankableUnit, Tier>,

    /// Indexed by `Tier::index()`
    tiers: [Vec<RankableUnit>; 6],

    read_only: bool,
}

impl AssignmentState {
    /// Seed tiers from stored assignments, then put every remaining
    /// catalog unit into UNRANKED. Each tier ends up in canonical order.
    pub fn initialize(catalog: Arc<Catalog>, stored: &[TierAssignment]) -> Self {
        let mut index = HashMap::with_capacity(catalog.unit_count());
        let mut tiers: [Vec<RankableUnit>; 6] = Default::default();

        for assignment in stored {
            if !catalog.contains(&assignment.unit) {
                debug!(unit = %assignment.unit, "dropping stored assignment for unit not in catalog");
                continue;
            }
            if index.contains_key(&assignment.unit) {
                warn!(unit = %assignment.unit, "duplicate stored assignment, keeping the first");
                continue;
            }
            index.insert(assignment.unit, assignment.tier);
            tiers[assignment.tier.index()].push(assignment.unit);
        }

        for unit in catalog.units() {
            if !index.contains_key(&unit) {
                index.insert(unit, Tier::Unranked);
                tiers[Tier::Unranked.index()].push(unit);
            }
        }

        for units in &mut tiers {
            units.sort();
        }

        AssignmentState {
            catalog,
            index,
            tiers,
            read_only: false,
        }
    }

    /// Move one unit. Rejected moves leave the state untouched.
    pub fn move_unit(
        &mut self,
        unit: RankableUnit,
        from: Tier,
        to: Tier,
    ) -> Result<TierDiff, MoveRejected> {
        if self.read_only {
            return Err(MoveRejected::ReadOnly);
        }
        if from == to {
            return Err(MoveRejected::SameTier);
        }

        let source = &mut self.tiers[from.index()];
        let position = source
            .iter()
            .position(|u| *u == unit)
            .ok_or(MoveRejected::NotInSourceTier)?;

        source.remove(position);
        self.tiers[to.index()].push(unit);
        self.index.insert(unit, to);

        Ok(TierDiff { unit, from, to })
    }

    /// Move a unit from wherever it currently is
    pub fn move_to(&mut self, unit: RankableUnit, to: Tier) -> Result<TierDiff, MoveRejected> {
        let from = self.tier_of(&unit).ok_or(MoveRejected::NotInSourceTier)?;
        self.move_unit(unit, from, to)
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn tier_of(&self, unit: &RankableUnit) -> Option<Tier> {
        self.index.get(unit).copied()
    }

    /// Units in render order
    pub fn units_in(&self, tier: Tier) -> &[RankableUnit] {
        &self.tiers[tier.index()]
    }

    pub fn total_units(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    /// Every placement outside UNRANKED, in canonical order
    pub fn assignments(&self) -> Vec<(RankableUnit, Tier)> {
        let mut placed: Vec<(RankableUnit, Tier)> = self
            .index
            .iter()
            .filter(|(_, tier)| tier.is_ranked())
            .map(|(unit, tier)| (*unit, *tier))
            .collect();
        placed.sort();
        placed
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}
