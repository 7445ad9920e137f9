// Commander Tier List - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod tier;
pub mod entities;
pub mod catalog;
pub mod db;
pub mod error;
pub mod config;
pub mod identity;     // Identity Resolver - local flag → fingerprint → remote lookup
pub mod assignment;   // Assignment State Machine
pub mod drop_target;  // Drop-Target Resolver
pub mod sync;         // Sync Protocol - single-change upserts
pub mod aggregation;  // Aggregation Engine - majority vote
pub mod client;

// Re-export commonly used types
pub use tier::{Tier, UnknownTier};
pub use entities::{Commander, Faction, MalformedUnitKey, PrestigeVariant, RankableUnit};
pub use catalog::{load_catalog_csv, Catalog};
pub use db::{
    MajorityRow, SqliteStore, TierAssignment, TierStore, UpsertOutcome,
    setup_database, install_aggregation_routine, drop_aggregation_routine,
};
pub use error::{Result, TierListError};
pub use config::Config;
pub use identity::{
    DeviceFingerprinter, DeviceInfo, Fingerprinter, Identity, IdentityDraft, IdentityId,
    IdentityResolver, KnownFingerprint, Resolution, SessionContext,
};
pub use assignment::{AssignmentState, MoveRejected, TierDiff};
pub use drop_target::{resolve_drop, DropContainer, Point, Rect};
pub use sync::{SyncOutcome, SyncProtocol};
pub use aggregation::{
    majority_vote, AggregateResult, AggregationEngine, AggregationPath, ConsensusEntry,
    SummaryStats, UnitTally,
};
pub use client::{SyncReport, TierListClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
