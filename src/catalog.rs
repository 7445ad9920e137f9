// 📚 Catalog - Immutable lookup table of commanders and their prestiges
//
// Built once from the catalog store and shared (Arc) by the assignment state,
// the aggregation engine and the renderers. Never mutated by ranking.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::entities::{Commander, Faction, PrestigeVariant, RankableUnit};

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    /// Sorted by commander id
    commanders: Vec<Commander>,

    #[serde(skip)]
    by_id: HashMap<i64, usize>,
}

impl Catalog {
    /// Build from commanders with their prestiges already attached.
    /// Commanders are ordered by id, prestiges by prestige id.
    pub fn new(mut commanders: Vec<Commander>) -> Self {
        commanders.sort_by_key(|c| c.id);
        commanders.dedup_by_key(|c| c.id);
        for commander in &mut commanders {
            commander.prestiges.sort_by_key(|p| p.id);
        }

        let by_id = commanders
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();

        Catalog { commanders, by_id }
    }

    /// Build from flat commander and prestige lists (how the store hands them out).
    /// Prestiges pointing at unknown commanders are dropped.
    pub fn from_parts(commanders: Vec<Commander>, prestiges: Vec<PrestigeVariant>) -> Self {
        let mut commanders = commanders;
        for prestige in prestiges {
            if let Some(commander) = commanders.iter_mut().find(|c| c.id == prestige.commander_id) {
                commander.add_prestige(prestige);
            } else {
                tracing::debug!(
                    prestige_id = prestige.id,
                    commander_id = prestige.commander_id,
                    "dropping prestige for unknown commander"
                );
            }
        }
        Catalog::new(commanders)
    }

    pub fn commanders(&self) -> &[Commander] {
        &self.commanders
    }

    pub fn commander(&self, id: i64) -> Option<&Commander> {
        self.by_id.get(&id).and_then(|&i| self.commanders.get(i))
    }

    pub fn prestige(&self, unit: &RankableUnit) -> Option<&PrestigeVariant> {
        let prestige_id = unit.prestige_id?;
        self.commander(unit.commander_id)?.prestige(prestige_id)
    }

    /// Every rankable unit in canonical order (commander id, then prestige id)
    pub fn units(&self) -> Vec<RankableUnit> {
        self.commanders.iter().flat_map(|c| c.units()).collect()
    }

    pub fn unit_count(&self) -> usize {
        self.commanders
            .iter()
            .map(|c| c.prestiges.len().max(1))
            .sum()
    }

    /// True only for units the catalog actually ranks: a bare commander
    /// without prestiges, or one of a commander's own prestiges.
    pub fn contains(&self, unit: &RankableUnit) -> bool {
        match (self.commander(unit.commander_id), unit.prestige_id) {
            (Some(commander), None) => !commander.has_prestiges(),
            (Some(commander), Some(prestige_id)) => commander.prestige(prestige_id).is_some(),
            (None, _) => false,
        }
    }

    /// Display label: "Commander" or "Commander (Prestige)"
    pub fn describe(&self, unit: &RankableUnit) -> String {
        let Some(commander) = self.commander(unit.commander_id) else {
            return format!("Unknown commander {}", unit.key());
        };

        match self.prestige(unit) {
            Some(prestige) => format!("{} ({})", commander.name, prestige.name),
            None => commander.name.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commanders.is_empty()
    }
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One row of the flat catalog CSV.
/// Bare commanders leave the prestige columns empty.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "Commander_ID")]
    commander_id: i64,

    #[serde(rename = "Commander")]
    commander: String,

    #[serde(rename = "Faction")]
    faction: String,

    #[serde(rename = "Image_URL", default)]
    image_url: String,

    #[serde(rename = "Prestige_ID", default)]
    prestige_id: Option<i64>,

    #[serde(rename = "Prestige", default)]
    prestige: Option<String>,

    #[serde(rename = "Prestige_Index", default)]
    prestige_index: Option<i64>,

    #[serde(rename = "Advantages", default)]
    advantages: Option<String>,

    #[serde(rename = "Disadvantages", default)]
    disadvantages: Option<String>,
}

pub fn load_catalog_csv(csv_path: &Path) -> Result<Catalog> {
    let rdr = csv::Reader::from_path(csv_path).context("Failed to open catalog CSV")?;
    read_catalog(rdr)
}

fn read_catalog<R: std::io::Read>(mut rdr: csv::Reader<R>) -> Result<Catalog> {
    let mut commanders: Vec<Commander> = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let row: CatalogRow =
            result.with_context(|| format!("Failed to deserialize catalog row {}", line + 2))?;

        let position = match commanders.iter().position(|c| c.id == row.commander_id) {
            Some(position) => position,
            None => {
                commanders.push(Commander::new(
                    row.commander_id,
                    row.commander.trim(),
                    Faction::parse(&row.faction),
                    row.image_url.trim(),
                ));
                commanders.len() - 1
            }
        };

        if let Some(prestige_id) = row.prestige_id {
            commanders[position].add_prestige(PrestigeVariant {
                id: prestige_id,
                commander_id: row.commander_id,
                name: row.prestige.unwrap_or_default().trim().to_string(),
                index: row.prestige_index.unwrap_or(0),
                advantages: row.advantages.unwrap_or_default(),
                disadvantages: row.disadvantages.unwrap_or_default(),
            });
        }
    }

    Ok(Catalog::new(commanders))
}

// ============================================================================
// TESTS
// ============================================================================
