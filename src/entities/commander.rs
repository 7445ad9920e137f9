// 🎖️ Commander Entity - Playable archetype + its prestige variants
//
// Read-only from the engine's point of view: commanders and prestiges come
// from the catalog store and are never mutated by ranking.
//
// A commander with zero prestiges is itself a single rankable unit.
// A commander with N prestiges contributes N units and never the bare commander.

use serde::{Deserialize, Serialize};

use super::unit::RankableUnit;

// ============================================================================
// FACTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    Terran,
    Zerg,
    Protoss,

    /// Anything the catalog carries that we do not recognise
    Unknown,
}

impl Faction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Faction::Terran => "Terran",
            Faction::Zerg => "Zerg",
            Faction::Protoss => "Protoss",
            Faction::Unknown => "Unknown",
        }
    }

    /// Lenient parse used at the storage boundary
    pub fn parse(raw: &str) -> Faction {
        match raw.trim().to_lowercase().as_str() {
            "terran" => Faction::Terran,
            "zerg" => Faction::Zerg,
            "protoss" => Faction::Protoss,
            _ => Faction::Unknown,
        }
    }
}

// ============================================================================
// PRESTIGE VARIANT
// ============================================================================

/// Optional named sub-build of a commander.
/// Mutually exclusive with the commander's other variants for ranking purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrestigeVariant {
    pub id: i64,
    pub commander_id: i64,
    pub name: String,

    /// Display order within the commander
    pub index: i64,

    /// Free-text notes, shown on hover
    #[serde(default)]
    pub advantages: String,
    #[serde(default)]
    pub disadvantages: String,
}

impl PrestigeVariant {
    pub fn unit(&self) -> RankableUnit {
        RankableUnit::prestige(self.commander_id, self.id)
    }
}

// ============================================================================
// COMMANDER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commander {
    pub id: i64,
    pub name: String,
    pub faction: Faction,
    pub image_url: String,

    /// Sorted by prestige id once attached to a catalog
    #[serde(default)]
    pub prestiges: Vec<PrestigeVariant>,
}

impl Commander {
    pub fn new(id: i64, name: &str, faction: Faction, image_url: &str) -> Self {
        Commander {
            id,
            name: name.to_string(),
            faction,
            image_url: image_url.to_string(),
            prestiges: Vec::new(),
        }
    }

    /// Attach a prestige variant; re-adding the same id replaces it
    pub fn add_prestige(&mut self, prestige: PrestigeVariant) {
        self.prestiges.retain(|p| p.id != prestige.id);
        self.prestiges.push(prestige);
        self.prestiges.sort_by_key(|p| p.id);
    }

    pub fn has_prestiges(&self) -> bool {
        !self.prestiges.is_empty()
    }

    pub fn prestige(&self, prestige_id: i64) -> Option<&PrestigeVariant> {
        self.prestiges.iter().find(|p| p.id == prestige_id)
    }

    /// Every rankable unit this commander contributes, in canonical order
    pub fn units(&self) -> Vec<RankableUnit> {
        if self.prestiges.is_empty() {
            vec![RankableUnit::bare(self.id)]
        } else {
            self.prestiges.iter().map(|p| p.unit()).collect()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
