// Entity Models
//
// Catalog entities are read-only values sourced from the catalog store.
// RankableUnit is the single canonical key used everywhere else.

pub mod commander;
pub mod unit;

pub use commander::{Commander, Faction, PrestigeVariant};
pub use unit::{MalformedUnitKey, RankableUnit};
