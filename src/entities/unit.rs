// 🧩 Rankable Unit - The atomic thing placed into a tier
//
// A (commander, prestige-or-none) pair. This is the one canonical unit type;
// storage rows and API paths convert into it at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RankableUnit {
    pub commander_id: i64,

    /// `None` for a commander without prestige variants
    pub prestige_id: Option<i64>,
}

impl RankableUnit {
    pub fn bare(commander_id: i64) -> Self {
        RankableUnit {
            commander_id,
            prestige_id: None,
        }
    }

    pub fn prestige(commander_id: i64, prestige_id: i64) -> Self {
        RankableUnit {
            commander_id,
            prestige_id: Some(prestige_id),
        }
    }

    /// Stable textual key: "{commander}-{prestige}" or "{commander}-base"
    pub fn key(&self) -> String {
        self.to_string()
    }
}

// Derived Ord is (commander_id, prestige_id) with None < Some(_),
// which is exactly the "bare first, then by prestige id" render order.

impl fmt::Display for RankableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prestige_id {
            Some(prestige_id) => write!(f, "{}-{}", self.commander_id, prestige_id),
            None => write!(f, "{}-base", self.commander_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed unit key: {0:?}")]
pub struct MalformedUnitKey(pub String);

impl FromStr for RankableUnit {
    type Err = MalformedUnitKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedUnitKey(s.to_string());

        let (commander, prestige) = s.trim().split_once('-').ok_or_else(malformed)?;
        let commander_id: i64 = commander.parse().map_err(|_| malformed())?;

        match prestige {
            "base" | "default" => Ok(RankableUnit::bare(commander_id)),
            other => {
                let prestige_id: i64 = other.parse().map_err(|_| malformed())?;
                Ok(RankableUnit::prestige(commander_id, prestige_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(RankableUnit::bare(4).key(), "4-base");
        assert_eq!(RankableUnit::prestige(4, 17).key(), "4-17");
    }

    #[test]
    fn test_parse_key() {
        assert_eq!("4-base".parse::<RankableUnit>().unwrap(), RankableUnit::bare(4));
        assert_eq!("4-default".parse::<RankableUnit>().unwrap(), RankableUnit::bare(4));
        assert_eq!(
            "4-17".parse::<RankableUnit>().unwrap(),
            RankableUnit::prestige(4, 17)
        );
        assert!("4".parse::<RankableUnit>().is_err());
        assert!("x-base".parse::<RankableUnit>().is_err());
        assert!("4-x".parse::<RankableUnit>().is_err());
    }

    #[test]
    fn test_bare_sorts_before_prestiges() {
        let mut units = vec![
            RankableUnit::prestige(2, 5),
            RankableUnit::prestige(1, 9),
            RankableUnit::bare(2),
            RankableUnit::prestige(2, 3),
        ];
        units.sort();

        assert_eq!(
            units,
            vec![
                RankableUnit::prestige(1, 9),
                RankableUnit::bare(2),
                RankableUnit::prestige(2, 3),
                RankableUnit::prestige(2, 5),
            ]
        );
    }
}
