use anyhow::{anyhow, Result};
use chrono::Duration;
use std::{env, fmt::Display, path::PathBuf, str::FromStr};
use tracing::{info, warn};

pub struct Config {
    pub db_path: PathBuf,
    pub session_path: PathBuf,
    pub port: u16,
    pub dedup_window_ms: i64,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let dedup_window_ms: i64 = try_load(&lookup, "TIERLIST_DEDUP_WINDOW_MS", "1000")?;
        if dedup_window_ms < 0 {
            return Err(anyhow!("TIERLIST_DEDUP_WINDOW_MS must not be negative"));
        }

        Ok(Self {
            db_path: try_load(&lookup, "TIERLIST_DB", "tierlist.db")?,
            session_path: try_load(&lookup, "TIERLIST_SESSION", "tierlist-session.json")?,
            port: try_load(&lookup, "TIERLIST_PORT", "3000")?,
            dedup_window_ms,
        })
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::milliseconds(self.dedup_window_ms)
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T>
where
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow!("Environment misconfigured: {key}={raw:?} ({e})")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.db_path, PathBuf::from("tierlist.db"));
        assert_eq!(config.session_path, PathBuf::from("tierlist-session.json"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.dedup_window(), Duration::milliseconds(1000));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("TIERLIST_DB", "/tmp/votes.db"),
            ("TIERLIST_PORT", "8080"),
            ("TIERLIST_DEDUP_WINDOW_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/votes.db"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.dedup_window_ms, 250);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(Config::from_lookup(lookup_from(&[("TIERLIST_PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("TIERLIST_DEDUP_WINDOW_MS", "-5")])).is_err());
    }
}
