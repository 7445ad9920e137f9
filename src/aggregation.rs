// 📊 Aggregation Engine - Community consensus from every visitor's rows
//
// Preferred path asks the store's majority routine; if that is missing or
// errors, the same reduction runs here over the raw rows. Both paths break
// ties toward the lowest tier, so they agree row-for-row.
//
// Post-process: every catalog unit nobody voted for lands in UNRANKED with
// zero votes; rows for units outside the catalog are ignored.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::db::{MajorityRow, TierAssignment, TierStore};
use crate::entities::RankableUnit;
use crate::error::{Result, TierListError};
use crate::tier::Tier;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Which path produced an `AggregateResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregationPath {
    Routine,
    ClientFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnitTally {
    pub unit: RankableUnit,

    /// Votes for the tier the unit resolved to
    pub votes: u32,

    /// Votes for the unit across all tiers
    pub total_votes: u32,
}

/// Tier -> units whose majority vote resolved to it. Every tier key is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    tiers: BTreeMap<Tier, Vec<UnitTally>>,
    path: AggregationPath,
}

impl AggregateResult {
    fn from_majority(rows: Vec<MajorityRow>, catalog: &Catalog, path: AggregationPath) -> Self {
        let mut tiers: BTreeMap<Tier, Vec<UnitTally>> =
            Tier::ALL.iter().map(|tier| (*tier, Vec::new())).collect();
        let mut placed = std::collections::HashSet::new();

        for row in rows {
            if !catalog.contains(&row.unit) {
                debug!(unit = %row.unit, "ignoring votes for unit not in catalog");
                continue;
            }
            placed.insert(row.unit);
            tiers.entry(row.tier).or_default().push(UnitTally {
                unit: row.unit,
                votes: row.votes,
                total_votes: row.total_votes,
            });
        }

        let unvoted = catalog.units().into_iter().filter(|unit| !placed.contains(unit));
        tiers
            .entry(Tier::Unranked)
            .or_default()
            .extend(unvoted.map(|unit| UnitTally {
                unit,
                votes: 0,
                total_votes: 0,
            }));

        for tallies in tiers.values_mut() {
            tallies.sort_by_key(|tally| tally.unit);
        }

        AggregateResult { tiers, path }
    }

    pub fn path(&self) -> AggregationPath {
        self.path
    }

    pub fn units_in(&self, tier: Tier) -> &[UnitTally] {
        self.tiers.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tier_of(&self, unit: &RankableUnit) -> Option<Tier> {
        self.tiers
            .iter()
            .find(|(_, tallies)| tallies.iter().any(|t| t.unit == *unit))
            .map(|(tier, _)| *tier)
    }

    /// Tiers in rank order with their tallies
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &[UnitTally])> {
        self.tiers.iter().map(|(tier, tallies)| (*tier, tallies.as_slice()))
    }

    pub fn total_units(&self) -> usize {
        self.tiers.values().map(Vec::len).sum()
    }

    /// Consensus rows joined with catalog data, in rank then canonical order
    pub fn entries(&self, catalog: &Catalog) -> Vec<ConsensusEntry> {
        self.iter()
            .flat_map(|(tier, tallies)| {
                tallies
                    .iter()
                    .map(move |tally| ConsensusEntry::hydrate(catalog, tier, tally))
            })
            .collect()
    }
}

/// One consensus row with the commander data a renderer needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusEntry {
    pub unit: RankableUnit,
    pub tier: Tier,
    pub votes: u32,
    pub total_votes: u32,
    pub commander_name: String,
    pub faction: String,
    pub image_url: String,
    pub prestige_name: Option<String>,
    pub advantages: String,
    pub disadvantages: String,
}

impl ConsensusEntry {
    fn hydrate(catalog: &Catalog, tier: Tier, tally: &UnitTally) -> Self {
        let commander = catalog.commander(tally.unit.commander_id);
        let prestige = catalog.prestige(&tally.unit);

        ConsensusEntry {
            unit: tally.unit,
            tier,
            votes: tally.votes,
            total_votes: tally.total_votes,
            commander_name: catalog.describe(&tally.unit),
            faction: commander
                .map(|c| c.faction.as_str().to_string())
                .unwrap_or_default(),
            image_url: commander.map(|c| c.image_url.clone()).unwrap_or_default(),
            prestige_name: prestige.map(|p| p.name.clone()),
            advantages: prestige.map(|p| p.advantages.clone()).unwrap_or_default(),
            disadvantages: prestige.map(|p| p.disadvantages.clone()).unwrap_or_default(),
        }
    }
}

/// Headline numbers for the summary page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_submissions: i64,

    /// Highest-scoring unit; ties go to canonical order
    pub top_unit: Option<RankableUnit>,

    /// Lowest-scoring unit above UNRANKED
    pub bottom_unit: Option<RankableUnit>,
}

impl SummaryStats {
    pub fn from_result(result: &AggregateResult, total_submissions: i64) -> Self {
        let top_unit = Tier::RANKED
            .iter()
            .find_map(|tier| result.units_in(*tier).first())
            .map(|tally| tally.unit);
        let bottom_unit = Tier::RANKED
            .iter()
            .rev()
            .find_map(|tier| result.units_in(*tier).first())
            .map(|tally| tally.unit);

        SummaryStats {
            total_submissions,
            top_unit,
            bottom_unit,
        }
    }
}

// ============================================================================
// MAJORITY VOTE
// ============================================================================

/// Client-side majority reduction: most rows per unit wins, ties go to the
/// lowest tier. Output is sorted by unit.
pub fn majority_vote(rows: &[TierAssignment]) -> Vec<MajorityRow> {
    let mut counts: HashMap<RankableUnit, [u32; 6]> = HashMap::new();
    for row in rows {
        counts.entry(row.unit).or_insert([0; 6])[row.tier.index()] += 1;
    }

    let mut majority: Vec<MajorityRow> = counts
        .into_iter()
        .filter_map(|(unit, per_tier)| {
            let mut winner: Option<(Tier, u32)> = None;
            for tier in Tier::ALL {
                let votes = per_tier[tier.index()];
                // Strictly greater keeps the earlier (lower) tier on ties
                if votes > winner.map_or(0, |(_, best)| best) {
                    winner = Some((tier, votes));
                }
            }

            winner.map(|(tier, votes)| MajorityRow {
                unit,
                tier,
                votes,
                total_votes: per_tier.iter().sum(),
            })
        })
        .collect();

    majority.sort_by_key(|row| row.unit);
    majority
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct AggregationEngine;

impl AggregationEngine {
    /// Compute the consensus, falling back to client-side counting when the
    /// store's routine is unavailable.
    pub fn compute<S: TierStore>(store: &S, catalog: &Catalog) -> Result<AggregateResult> {
        match Self::via_routine(store, catalog) {
            Ok(result) => Ok(result),
            Err(e) => {
                // Never user-visible: just log and take the fallback path
                warn!(error = %e, "using client-side aggregation");
                Self::via_fallback(store, catalog)
            }
        }
    }

    /// Server-side routine only
    pub fn via_routine<S: TierStore>(store: &S, catalog: &Catalog) -> Result<AggregateResult> {
        let rows = store
            .aggregate_majority()
            .map_err(TierListError::AggregationRoutineUnavailable)?;

        info!(units = rows.len(), "aggregated via store routine");
        Ok(AggregateResult::from_majority(
            rows,
            catalog,
            AggregationPath::Routine,
        ))
    }

    /// Raw rows reduced here
    pub fn via_fallback<S: TierStore>(store: &S, catalog: &Catalog) -> Result<AggregateResult> {
        let entries = store.all_entries().map_err(TierListError::Aggregation)?;
        let rows = majority_vote(&entries);

        info!(entries = entries.len(), units = rows.len(), "aggregated client-side");
        Ok(AggregateResult::from_majority(
            rows,
            catalog,
            AggregationPath::ClientFallback,
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::db::{drop_aggregation_routine, SqliteStore};
    use crate::identity::{DeviceInfo, IdentityDraft, IdentityId};

    fn new_voter(store: &SqliteStore) -> IdentityId {
        store
            .create_identity(&IdentityDraft {
                fingerprint: None,
                user_agent: "voter".to_string(),
                device_info: DeviceInfo::default(),
            })
            .unwrap()
    }

    fn seeded_store(votes: &[(usize, RankableUnit, Tier)]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.import_catalog(&sample_catalog()).unwrap();

        let voter_count = votes.iter().map(|(v, _, _)| v + 1).max().unwrap_or(0);
        let voters: Vec<IdentityId> = (0..voter_count).map(|_| new_voter(&store)).collect();
        for (voter, unit, tier) in votes {
            store
                .upsert_single_assignment(&voters[*voter], unit, *tier)
                .unwrap();
        }
        store
    }

    fn row(voter: &str, unit: RankableUnit, tier: Tier) -> TierAssignment {
        TierAssignment {
            identity_id: IdentityId(voter.to_string()),
            unit,
            tier,
        }
    }

    #[test]
    fn test_majority_correctness() {
        let unit_a = RankableUnit::bare(1);
        let store = seeded_store(&[
            (0, unit_a, Tier::T1),
            (1, unit_a, Tier::T1),
            (2, unit_a, Tier::T2),
        ]);

        let result = AggregationEngine::compute(&store, &sample_catalog()).unwrap();

        assert_eq!(result.path(), AggregationPath::Routine);
        assert_eq!(
            result.units_in(Tier::T1),
            &[UnitTally {
                unit: unit_a,
                votes: 2,
                total_votes: 3
            }]
        );
        // No rows at all: unit B defaults to UNRANKED
        assert_eq!(result.tier_of(&RankableUnit::bare(3)), Some(Tier::Unranked));
    }

    #[test]
    fn test_every_catalog_unit_is_present() {
        let store = seeded_store(&[(0, RankableUnit::prestige(2, 21), Tier::T4)]);
        let catalog = sample_catalog();

        let result = AggregationEngine::compute(&store, &catalog).unwrap();

        assert_eq!(result.total_units(), catalog.unit_count());
        for unit in catalog.units() {
            assert!(result.tier_of(&unit).is_some(), "missing {}", unit);
        }
        let unranked: Vec<&UnitTally> = result.units_in(Tier::Unranked).iter().collect();
        assert!(unranked.iter().all(|t| t.votes == 0 && t.total_votes == 0));
    }

    #[test]
    fn test_routine_and_fallback_agree() {
        let queen = RankableUnit::prestige(2, 21);
        let matriarch = RankableUnit::prestige(2, 22);
        let raynor = RankableUnit::bare(1);
        let artanis = RankableUnit::bare(3);

        let store = seeded_store(&[
            (0, raynor, Tier::T1),
            (1, raynor, Tier::T2),
            (2, raynor, Tier::T2),
            (0, queen, Tier::T5),
            (1, queen, Tier::T3),
            (0, matriarch, Tier::Unranked),
            (1, matriarch, Tier::T4),
            (2, matriarch, Tier::Unranked),
            (3, artanis, Tier::T1),
            // Bare row for a commander with prestiges: not a catalog unit
            (3, RankableUnit::bare(2), Tier::T1),
        ]);
        let catalog = sample_catalog();

        let routine = AggregationEngine::via_routine(&store, &catalog).unwrap();
        let fallback = AggregationEngine::via_fallback(&store, &catalog).unwrap();

        assert_eq!(routine.path(), AggregationPath::Routine);
        assert_eq!(fallback.path(), AggregationPath::ClientFallback);
        assert_eq!(
            routine.iter().collect::<Vec<_>>(),
            fallback.iter().collect::<Vec<_>>()
        );

        assert_eq!(routine.tier_of(&raynor), Some(Tier::T2));
        assert_eq!(routine.tier_of(&queen), Some(Tier::T3));
        assert_eq!(routine.tier_of(&matriarch), Some(Tier::Unranked));
        assert_eq!(routine.tier_of(&RankableUnit::bare(2)), None);
    }

    #[test]
    fn test_missing_routine_falls_back() {
        let store = seeded_store(&[(0, RankableUnit::bare(3), Tier::T2)]);
        drop_aggregation_routine(store.connection()).unwrap();

        let err = AggregationEngine::via_routine(&store, &sample_catalog()).unwrap_err();
        assert!(!err.is_user_visible());

        let result = AggregationEngine::compute(&store, &sample_catalog()).unwrap();
        assert_eq!(result.path(), AggregationPath::ClientFallback);
        assert_eq!(result.tier_of(&RankableUnit::bare(3)), Some(Tier::T2));
    }

    #[test]
    fn test_both_paths_failing_is_an_error() {
        let store = SqliteStore::from_connection(rusqlite::Connection::open_in_memory().unwrap());

        let err = AggregationEngine::compute(&store, &sample_catalog()).unwrap_err();
        assert!(matches!(err, TierListError::Aggregation(_)));
    }

    #[test]
    fn test_majority_vote_tie_goes_to_lowest_tier() {
        let unit = RankableUnit::bare(1);
        let rows = vec![
            row("a", unit, Tier::T5),
            row("b", unit, Tier::Unranked),
            row("c", unit, Tier::T3),
        ];

        let majority = majority_vote(&rows);
        assert_eq!(
            majority,
            vec![MajorityRow {
                unit,
                tier: Tier::T3,
                votes: 1,
                total_votes: 3
            }]
        );
    }

    #[test]
    fn test_majority_vote_empty() {
        assert!(majority_vote(&[]).is_empty());
    }

    #[test]
    fn test_summary_stats() {
        let store = seeded_store(&[
            (0, RankableUnit::bare(3), Tier::T2),
            (1, RankableUnit::prestige(2, 22), Tier::T2),
            (1, RankableUnit::bare(1), Tier::T4),
        ]);
        let result = AggregationEngine::compute(&store, &sample_catalog()).unwrap();

        let stats = SummaryStats::from_result(&result, store.count_identities().unwrap());

        assert_eq!(stats.total_submissions, 2);
        // T2 tie: canonical order puts Kerrigan (2) before Artanis (3)
        assert_eq!(stats.top_unit, Some(RankableUnit::prestige(2, 22)));
        assert_eq!(stats.bottom_unit, Some(RankableUnit::bare(1)));
    }

    #[test]
    fn test_summary_stats_without_votes() {
        let store = seeded_store(&[]);
        let result = AggregationEngine::compute(&store, &sample_catalog()).unwrap();

        let stats = SummaryStats::from_result(&result, 0);
        assert_eq!(stats.top_unit, None);
        assert_eq!(stats.bottom_unit, None);
    }

    #[test]
    fn test_entries_are_hydrated() {
        let store = seeded_store(&[(0, RankableUnit::prestige(2, 21), Tier::T1)]);
        let catalog = sample_catalog();
        let result = AggregationEngine::compute(&store, &catalog).unwrap();

        let entries = result.entries(&catalog);
        assert_eq!(entries.len(), 4);

        let first = &entries[0];
        assert_eq!(first.tier, Tier::T1);
        assert_eq!(first.commander_name, "Kerrigan (Queen of Blades)");
        assert_eq!(first.faction, "Zerg");
        assert_eq!(first.prestige_name.as_deref(), Some("Queen of Blades"));
        assert_eq!(first.advantages, "Stronger abilities");
        assert_eq!(first.disadvantages, "Weaker units");

        assert!(entries[1..].iter().all(|e| e.tier == Tier::Unranked));
    }
}
