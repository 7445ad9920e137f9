use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog::Catalog;
use crate::entities::{Commander, Faction, PrestigeVariant, RankableUnit};
use crate::identity::{DeviceInfo, Identity, IdentityDraft, IdentityId};
use crate::tier::Tier;

// ============================================================================
// ROWS AT THE STORAGE BOUNDARY
// ============================================================================

/// One visitor's placement of one unit.
/// At most one per (identity, unit); owned by the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAssignment {
    pub identity_id: IdentityId,
    pub unit: RankableUnit,
    pub tier: Tier,
}

/// Winning tier for one unit as reported by a majority computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorityRow {
    pub unit: RankableUnit,
    pub tier: Tier,

    /// Rows that voted for the winning tier
    pub votes: u32,

    /// All rows for this unit, any tier
    pub total_votes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

// ============================================================================
// STORE INTERFACE
// ============================================================================

/// Opaque key-value/query service backing the engine.
///
/// Every method may fail; the engine decides which failures are fatal
/// to an operation and which degrade (see `TierListError`).
pub trait TierStore {
    fn fetch_catalog(&self) -> Result<Catalog>;

    fn find_identity_by_fingerprint(&self, fingerprint: &str) -> Result<Option<IdentityId>>;

    fn create_identity(&self, draft: &IdentityDraft) -> Result<IdentityId>;

    fn get_identity(&self, id: &IdentityId) -> Result<Option<Identity>>;

    /// `None` when the identity has no stored rows
    fn fetch_submission(&self, id: &IdentityId) -> Result<Option<Vec<TierAssignment>>>;

    /// Overwrite-or-insert the single row for (identity, unit)
    fn upsert_single_assignment(
        &self,
        id: &IdentityId,
        unit: &RankableUnit,
        tier: Tier,
    ) -> Result<UpsertOutcome>;

    /// Delete every row the identity owns, keeping the identity
    fn clear_submission(&self, id: &IdentityId) -> Result<usize>;

    /// Atomically replace every row the identity owns
    fn replace_submission(&self, id: &IdentityId, assignments: &[(RankableUnit, Tier)]) -> Result<()>;

    /// Server-side majority routine
    fn aggregate_majority(&self) -> Result<Vec<MajorityRow>>;

    /// Raw rows for client-side aggregation
    fn all_entries(&self) -> Result<Vec<TierAssignment>>;

    fn count_identities(&self) -> Result<i64>;

    /// Removes the identity and, through the cascade, all of its rows
    fn delete_identity(&self, id: &IdentityId) -> Result<bool>;

    fn import_catalog(&self, catalog: &Catalog) -> Result<usize>;
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Needed for identity -> entries cascade
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS commanders (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            faction TEXT NOT NULL,
            image_url TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS prestiges (
            id INTEGER PRIMARY KEY,
            commander_id INTEGER NOT NULL REFERENCES commanders(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            \"index\" INTEGER NOT NULL DEFAULT 0,
            advantages TEXT NOT NULL DEFAULT '',
            disadvantages TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS identities (
            id TEXT PRIMARY KEY,
            fingerprint TEXT,
            user_agent TEXT NOT NULL DEFAULT '',
            device_info TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submission_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identity_id TEXT NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
            commander_id INTEGER NOT NULL,
            prestige_id INTEGER,
            tier TEXT NOT NULL CHECK (tier IN ('T1', 'T2', 'T3', 'T4', 'T5', 'UNRANKED')),
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    // UNIQUE treats NULLs as distinct, so bare commanders need the IFNULL key
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_identity_unit
         ON submission_entries(identity_id, commander_id, IFNULL(prestige_id, -1))",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_identities_fingerprint ON identities(fingerprint)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_prestiges_commander ON prestiges(commander_id)",
        [],
    )?;

    Ok(())
}

/// Install the majority-vote routine as a view.
///
/// Ties go to the lowest tier code, which is the same rule `majority_vote`
/// applies client-side.
pub fn install_aggregation_routine(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE VIEW IF NOT EXISTS most_common_tiers AS
         WITH counts AS (
             SELECT commander_id, prestige_id, tier, COUNT(*) AS votes
             FROM submission_entries
             GROUP BY commander_id, prestige_id, tier
         ),
         ranked AS (
             SELECT commander_id, prestige_id, tier, votes,
                    SUM(votes) OVER (PARTITION BY commander_id, prestige_id) AS total_votes,
                    ROW_NUMBER() OVER (
                        PARTITION BY commander_id, prestige_id
                        ORDER BY votes DESC, tier ASC
                    ) AS position
             FROM counts
         )
         SELECT commander_id, prestige_id, tier, votes, total_votes
         FROM ranked
         WHERE position = 1",
        [],
    )?;

    Ok(())
}

pub fn drop_aggregation_routine(conn: &Connection) -> Result<()> {
    conn.execute("DROP VIEW IF EXISTS most_common_tiers", [])?;
    Ok(())
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file with schema and aggregation routine
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        setup_database(&conn)?;
        install_aggregation_routine(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        install_aggregation_routine(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// Wrap a connection as-is; the caller decides which schema pieces exist
    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn tier_from_row(row: &Row, idx: usize) -> rusqlite::Result<Tier> {
    let code: String = row.get(idx)?;
    code.parse::<Tier>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn unit_from_row(row: &Row, commander_idx: usize, prestige_idx: usize) -> rusqlite::Result<RankableUnit> {
    Ok(RankableUnit {
        commander_id: row.get(commander_idx)?,
        prestige_id: row.get(prestige_idx)?,
    })
}

impl TierStore for SqliteStore {
    fn fetch_catalog(&self) -> Result<Catalog> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, faction, image_url FROM commanders ORDER BY id")?;
        let commanders = stmt
            .query_map([], |row| {
                let faction: String = row.get(2)?;
                Ok(Commander {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    faction: Faction::parse(&faction),
                    image_url: row.get(3)?,
                    prestiges: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, commander_id, name, \"index\", advantages, disadvantages
             FROM prestiges
             ORDER BY \"index\"",
        )?;
        let prestiges = stmt
            .query_map([], |row| {
                Ok(PrestigeVariant {
                    id: row.get(0)?,
                    commander_id: row.get(1)?,
                    name: row.get(2)?,
                    index: row.get(3)?,
                    advantages: row.get(4)?,
                    disadvantages: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Catalog::from_parts(commanders, prestiges))
    }

    fn find_identity_by_fingerprint(&self, fingerprint: &str) -> Result<Option<IdentityId>> {
        // Oldest record wins if a fingerprint was ever registered twice
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM identities WHERE fingerprint = ?1
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT 1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;

        Ok(id.map(IdentityId))
    }

    fn create_identity(&self, draft: &IdentityDraft) -> Result<IdentityId> {
        let id = IdentityId::generate();
        let device_info_json = serde_json::to_string(&draft.device_info)?;

        self.conn.execute(
            "INSERT INTO identities (id, fingerprint, user_agent, device_info, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                draft.fingerprint,
                draft.user_agent,
                device_info_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(id)
    }

    fn get_identity(&self, id: &IdentityId) -> Result<Option<Identity>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, fingerprint, user_agent, device_info, created_at
                 FROM identities WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, fingerprint, user_agent, device_info_json, created_at_str)) = row else {
            return Ok(None);
        };

        let device_info: DeviceInfo =
            serde_json::from_str(&device_info_json).context("Corrupt device_info column")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .context("Corrupt created_at column")?
            .with_timezone(&Utc);

        Ok(Some(Identity {
            id: IdentityId(id),
            fingerprint,
            user_agent,
            device_info,
            created_at,
        }))
    }

    fn fetch_submission(&self, id: &IdentityId) -> Result<Option<Vec<TierAssignment>>> {
        let mut stmt = self.conn.prepare(
            "SELECT commander_id, prestige_id, tier
             FROM submission_entries
             WHERE identity_id = ?1
             ORDER BY commander_id, prestige_id",
        )?;

        let assignments = stmt
            .query_map(params![id.as_str()], |row| {
                Ok(TierAssignment {
                    identity_id: id.clone(),
                    unit: unit_from_row(row, 0, 1)?,
                    tier: tier_from_row(row, 2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if assignments.is_empty() {
            Ok(None)
        } else {
            Ok(Some(assignments))
        }
    }

    fn upsert_single_assignment(
        &self,
        id: &IdentityId,
        unit: &RankableUnit,
        tier: Tier,
    ) -> Result<UpsertOutcome> {
        let now = Utc::now().to_rfc3339();

        // `IS` compares NULL prestige ids as equal
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM submission_entries
                 WHERE identity_id = ?1 AND commander_id = ?2 AND prestige_id IS ?3",
                params![id.as_str(), unit.commander_id, unit.prestige_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(row_id) => {
                self.conn.execute(
                    "UPDATE submission_entries SET tier = ?1, updated_at = ?2 WHERE id = ?3",
                    params![tier.code(), now, row_id],
                )?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO submission_entries (identity_id, commander_id, prestige_id, tier, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id.as_str(), unit.commander_id, unit.prestige_id, tier.code(), now],
                )?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn clear_submission(&self, id: &IdentityId) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM submission_entries WHERE identity_id = ?1",
            params![id.as_str()],
        )?;
        Ok(deleted)
    }

    fn replace_submission(&self, id: &IdentityId, assignments: &[(RankableUnit, Tier)]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM submission_entries WHERE identity_id = ?1",
            params![id.as_str()],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO submission_entries (identity_id, commander_id, prestige_id, tier, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (unit, tier) in assignments {
                stmt.execute(params![
                    id.as_str(),
                    unit.commander_id,
                    unit.prestige_id,
                    tier.code(),
                    now
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn aggregate_majority(&self) -> Result<Vec<MajorityRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT commander_id, prestige_id, tier, votes, total_votes
                 FROM most_common_tiers
                 ORDER BY commander_id, prestige_id",
            )
            .context("most_common_tiers routine is not installed")?;

        let rows = stmt
            .query_map([], |row| {
                Ok(MajorityRow {
                    unit: unit_from_row(row, 0, 1)?,
                    tier: tier_from_row(row, 2)?,
                    votes: row.get(3)?,
                    total_votes: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn all_entries(&self) -> Result<Vec<TierAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT identity_id, commander_id, prestige_id, tier FROM submission_entries",
        )?;

        let entries = stmt
            .query_map([], |row| {
                Ok(TierAssignment {
                    identity_id: IdentityId(row.get(0)?),
                    unit: unit_from_row(row, 1, 2)?,
                    tier: tier_from_row(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn count_identities(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;

        Ok(count)
    }

    fn delete_identity(&self, id: &IdentityId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM identities WHERE id = ?1", params![id.as_str()])?;
        Ok(deleted > 0)
    }

    fn import_catalog(&self, catalog: &Catalog) -> Result<usize> {
        if catalog.is_empty() {
            return Err(anyhow!("Refusing to import an empty catalog"));
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut imported = 0;

        for commander in catalog.commanders() {
            tx.execute(
                "INSERT INTO commanders (id, name, faction, image_url) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     faction = excluded.faction,
                     image_url = excluded.image_url",
                params![
                    commander.id,
                    commander.name,
                    commander.faction.as_str(),
                    commander.image_url
                ],
            )?;

            for prestige in &commander.prestiges {
                tx.execute(
                    "INSERT INTO prestiges (id, commander_id, name, \"index\", advantages, disadvantages)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                         commander_id = excluded.commander_id,
                         name = excluded.name,
                         \"index\" = excluded.\"index\",
                         advantages = excluded.advantages,
                         disadvantages = excluded.disadvantages",
                    params![
                        prestige.id,
                        prestige.commander_id,
                        prestige.name,
                        prestige.index,
                        prestige.advantages,
                        prestige.disadvantages
                    ],
                )?;
            }

            imported += 1;
        }

        tx.commit()?;
        tracing::info!(commanders = imported, units = catalog.unit_count(), "catalog imported");

        Ok(imported)
    }
}

/// Store wrapper that counts writes and fails on demand
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::Cell;

    pub(crate) struct FlakyStore {
        pub inner: SqliteStore,
        pub fail_catalog: Cell<bool>,
        pub fail_lookup: Cell<bool>,
        pub fail_create: Cell<bool>,
        pub fail_upsert: Cell<bool>,
        pub fail_replace: Cell<bool>,
        pub upserts: Cell<usize>,
    }

    impl FlakyStore {
        pub(crate) fn new(inner: SqliteStore) -> Self {
            FlakyStore {
                inner,
                fail_catalog: Cell::new(false),
                fail_lookup: Cell::new(false),
                fail_create: Cell::new(false),
                fail_upsert: Cell::new(false),
                fail_replace: Cell::new(false),
                upserts: Cell::new(0),
            }
        }
    }

    fn fail_if(flag: &Cell<bool>, what: &str) -> Result<()> {
        if flag.get() {
            Err(anyhow!("{} unavailable", what))
        } else {
            Ok(())
        }
    }

    impl TierStore for FlakyStore {
        fn fetch_catalog(&self) -> Result<Catalog> {
            fail_if(&self.fail_catalog, "catalog")?;
            self.inner.fetch_catalog()
        }

        fn find_identity_by_fingerprint(&self, fingerprint: &str) -> Result<Option<IdentityId>> {
            fail_if(&self.fail_lookup, "identity lookup")?;
            self.inner.find_identity_by_fingerprint(fingerprint)
        }

        fn create_identity(&self, draft: &IdentityDraft) -> Result<IdentityId> {
            fail_if(&self.fail_create, "identity store")?;
            self.inner.create_identity(draft)
        }

        fn get_identity(&self, id: &IdentityId) -> Result<Option<Identity>> {
            self.inner.get_identity(id)
        }

        fn fetch_submission(&self, id: &IdentityId) -> Result<Option<Vec<TierAssignment>>> {
            self.inner.fetch_submission(id)
        }

        fn upsert_single_assignment(
            &self,
            id: &IdentityId,
            unit: &RankableUnit,
            tier: Tier,
        ) -> Result<UpsertOutcome> {
            fail_if(&self.fail_upsert, "upsert")?;
            self.upserts.set(self.upserts.get() + 1);
            self.inner.upsert_single_assignment(id, unit, tier)
        }

        fn clear_submission(&self, id: &IdentityId) -> Result<usize> {
            self.inner.clear_submission(id)
        }

        fn replace_submission(
            &self,
            id: &IdentityId,
            assignments: &[(RankableUnit, Tier)],
        ) -> Result<()> {
            fail_if(&self.fail_replace, "transactional replace")?;
            self.inner.replace_submission(id, assignments)
        }

        fn aggregate_majority(&self) -> Result<Vec<MajorityRow>> {
            self.inner.aggregate_majority()
        }

        fn all_entries(&self) -> Result<Vec<TierAssignment>> {
            self.inner.all_entries()
        }

        fn count_identities(&self) -> Result<i64> {
            self.inner.count_identities()
        }

        fn delete_identity(&self, id: &IdentityId) -> Result<bool> {
            self.inner.delete_identity(id)
        }

        fn import_catalog(&self, catalog: &Catalog) -> Result<usize> {
            self.inner.import_catalog(catalog)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;

    fn store_with_catalog() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.import_catalog(&sample_catalog()).unwrap();
        store
    }

    fn draft(fingerprint: Option<&str>) -> IdentityDraft {
        IdentityDraft {
            fingerprint: fingerprint.map(str::to_string),
            user_agent: "test-agent/1.0".to_string(),
            device_info: DeviceInfo::default(),
        }
    }

    #[test]
    fn test_catalog_round_trip() {
        let store = store_with_catalog();
        let catalog = store.fetch_catalog().unwrap();

        assert_eq!(catalog.units(), sample_catalog().units());
        assert_eq!(catalog.commander(2).unwrap().faction, Faction::Zerg);

        let queen = catalog.prestige(&RankableUnit::prestige(2, 21)).unwrap();
        assert_eq!(queen.advantages, "Stronger abilities");
    }

    #[test]
    fn test_import_catalog_twice_is_idempotent() {
        let store = store_with_catalog();
        store.import_catalog(&sample_catalog()).unwrap();

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM prestiges", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_identity_lookup_by_fingerprint() {
        let store = store_with_catalog();

        let id = store.create_identity(&draft(Some("fp-abc"))).unwrap();
        assert_eq!(
            store.find_identity_by_fingerprint("fp-abc").unwrap(),
            Some(id.clone())
        );
        assert_eq!(store.find_identity_by_fingerprint("fp-zzz").unwrap(), None);

        let identity = store.get_identity(&id).unwrap().unwrap();
        assert_eq!(identity.fingerprint.as_deref(), Some("fp-abc"));
        assert_eq!(identity.user_agent, "test-agent/1.0");
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let store = store_with_catalog();
        let id = store.create_identity(&draft(None)).unwrap();
        let unit = RankableUnit::prestige(2, 21);

        assert_eq!(
            store.upsert_single_assignment(&id, &unit, Tier::T3).unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert_single_assignment(&id, &unit, Tier::T1).unwrap(),
            UpsertOutcome::Updated
        );

        let rows = store.fetch_submission(&id).unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tier, Tier::T1);
    }

    #[test]
    fn test_upsert_bare_commander_is_null_safe() {
        let store = store_with_catalog();
        let id = store.create_identity(&draft(None)).unwrap();
        let unit = RankableUnit::bare(1);

        store.upsert_single_assignment(&id, &unit, Tier::T2).unwrap();
        let second = store.upsert_single_assignment(&id, &unit, Tier::T4).unwrap();

        assert_eq!(second, UpsertOutcome::Updated);
        assert_eq!(store.all_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_unique_index_rejects_duplicate_bare_rows() {
        let store = store_with_catalog();
        let id = store.create_identity(&draft(None)).unwrap();

        let insert = |tier: &str| {
            store.connection().execute(
                "INSERT INTO submission_entries (identity_id, commander_id, prestige_id, tier, updated_at)
                 VALUES (?1, 1, NULL, ?2, 'now')",
                params![id.as_str(), tier],
            )
        };

        insert("T1").unwrap();
        match insert("T2") {
            Err(rusqlite::Error::SqliteFailure(err, _)) => {
                assert_eq!(err.code, rusqlite::ErrorCode::ConstraintViolation)
            }
            other => panic!("expected constraint violation, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_submission_none_without_rows() {
        let store = store_with_catalog();
        let id = store.create_identity(&draft(None)).unwrap();

        assert!(store.fetch_submission(&id).unwrap().is_none());
    }

    #[test]
    fn test_replace_submission() {
        let store = store_with_catalog();
        let id = store.create_identity(&draft(None)).unwrap();

        store
            .upsert_single_assignment(&id, &RankableUnit::bare(3), Tier::T5)
            .unwrap();
        store
            .replace_submission(
                &id,
                &[
                    (RankableUnit::bare(1), Tier::T1),
                    (RankableUnit::prestige(2, 22), Tier::T2),
                ],
            )
            .unwrap();

        let rows = store.fetch_submission(&id).unwrap().unwrap();
        let units: Vec<RankableUnit> = rows.iter().map(|r| r.unit).collect();
        assert_eq!(units, vec![RankableUnit::bare(1), RankableUnit::prestige(2, 22)]);
    }

    #[test]
    fn test_clear_submission_keeps_identity() {
        let store = store_with_catalog();
        let id = store.create_identity(&draft(None)).unwrap();
        store
            .upsert_single_assignment(&id, &RankableUnit::bare(1), Tier::T1)
            .unwrap();
        store
            .upsert_single_assignment(&id, &RankableUnit::bare(3), Tier::T3)
            .unwrap();

        assert_eq!(store.clear_submission(&id).unwrap(), 2);
        assert!(store.fetch_submission(&id).unwrap().is_none());
        assert!(store.get_identity(&id).unwrap().is_some());
    }

    #[test]
    fn test_delete_identity_cascades() {
        let store = store_with_catalog();
        let keep = store.create_identity(&draft(None)).unwrap();
        let gone = store.create_identity(&draft(None)).unwrap();

        store
            .upsert_single_assignment(&keep, &RankableUnit::bare(1), Tier::T1)
            .unwrap();
        store
            .upsert_single_assignment(&gone, &RankableUnit::bare(1), Tier::T2)
            .unwrap();
        store
            .upsert_single_assignment(&gone, &RankableUnit::bare(3), Tier::T2)
            .unwrap();

        assert!(store.delete_identity(&gone).unwrap());
        assert!(!store.delete_identity(&gone).unwrap());

        let entries = store.all_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity_id, keep);
        assert_eq!(store.count_identities().unwrap(), 1);
    }

    #[test]
    fn test_tier_check_constraint() {
        let store = store_with_catalog();
        let id = store.create_identity(&draft(None)).unwrap();

        let result = store.connection().execute(
            "INSERT INTO submission_entries (identity_id, commander_id, prestige_id, tier, updated_at)
             VALUES (?1, 1, NULL, 'S+', 'now')",
            params![id.as_str()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_aggregate_majority_routine() {
        let store = store_with_catalog();
        let voters: Vec<IdentityId> = (0..3)
            .map(|_| store.create_identity(&draft(None)).unwrap())
            .collect();
        let unit = RankableUnit::bare(1);

        store.upsert_single_assignment(&voters[0], &unit, Tier::T1).unwrap();
        store.upsert_single_assignment(&voters[1], &unit, Tier::T1).unwrap();
        store.upsert_single_assignment(&voters[2], &unit, Tier::T2).unwrap();

        let rows = store.aggregate_majority().unwrap();
        assert_eq!(
            rows,
            vec![MajorityRow {
                unit,
                tier: Tier::T1,
                votes: 2,
                total_votes: 3,
            }]
        );
    }

    #[test]
    fn test_aggregate_majority_tie_goes_to_lower_tier() {
        let store = store_with_catalog();
        let a = store.create_identity(&draft(None)).unwrap();
        let b = store.create_identity(&draft(None)).unwrap();
        let unit = RankableUnit::prestige(2, 21);

        store.upsert_single_assignment(&a, &unit, Tier::T4).unwrap();
        store.upsert_single_assignment(&b, &unit, Tier::T2).unwrap();

        let rows = store.aggregate_majority().unwrap();
        assert_eq!(rows[0].tier, Tier::T2);
        assert_eq!(rows[0].votes, 1);
        assert_eq!(rows[0].total_votes, 2);
    }

    #[test]
    fn test_aggregate_majority_fails_without_routine() {
        let store = store_with_catalog();
        drop_aggregation_routine(store.connection()).unwrap();

        assert!(store.aggregate_majority().is_err());
    }
}
