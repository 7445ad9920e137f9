// 🏅 Tier - The fixed, ordered set of rank buckets
//
// Five meaningful ranks plus the implicit "not yet placed" bucket.
// A tier is never free text: storage codes and display names both parse
// back into this enum, anything else is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// TIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Over Powered
    T1,
    /// Very Strong
    T2,
    /// Strong
    T3,
    /// Meh
    T4,
    /// Poop
    T5,
    /// Never Played
    Unranked,
}

impl Tier {
    /// All tiers in rank order, UNRANKED last
    pub const ALL: [Tier; 6] = [
        Tier::T1,
        Tier::T2,
        Tier::T3,
        Tier::T4,
        Tier::T5,
        Tier::Unranked,
    ];

    /// The five meaningful ranks
    pub const RANKED: [Tier; 5] = [Tier::T1, Tier::T2, Tier::T3, Tier::T4, Tier::T5];

    /// Storage code. Codes sort lexically in rank order ("T1" < ... < "T5" < "UNRANKED").
    pub fn code(&self) -> &'static str {
        match self {
            Tier::T1 => "T1",
            Tier::T2 => "T2",
            Tier::T3 => "T3",
            Tier::T4 => "T4",
            Tier::T5 => "T5",
            Tier::Unranked => "UNRANKED",
        }
    }

    /// Human-facing tier label
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::T1 => "Over Powered",
            Tier::T2 => "Very Strong",
            Tier::T3 => "Strong",
            Tier::T4 => "Meh",
            Tier::T5 => "Poop",
            Tier::Unranked => "Never Played",
        }
    }

    /// Score used by summary statistics (T1 = 5 ... T5 = 1, UNRANKED = 0)
    pub fn score(&self) -> u8 {
        match self {
            Tier::T1 => 5,
            Tier::T2 => 4,
            Tier::T3 => 3,
            Tier::T4 => 2,
            Tier::T5 => 1,
            Tier::Unranked => 0,
        }
    }

    pub fn is_ranked(&self) -> bool {
        *self != Tier::Unranked
    }

    /// Position in `Tier::ALL`
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Tier> {
        Tier::ALL.get(index).copied()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown tier: {0:?}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    /// Accepts a storage code or a display name, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Tier::ALL
            .iter()
            .find(|tier| {
                tier.code().eq_ignore_ascii_case(needle)
                    || tier.display_name().eq_ignore_ascii_case(needle)
            })
            .copied()
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
