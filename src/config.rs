// ⚙️ Config - runtime settings from the environment (and .env, if present)

use crate::billing::DEFAULT_RATE_PER_MINUTE;
use crate::grid::LotLayout;
use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    pub layout: LotLayout,
    pub rate_per_minute: f64,
    pub bind_addr: String,
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("parking.db"),
            layout: LotLayout::default(),
            rate_per_minute: DEFAULT_RATE_PER_MINUTE,
            bind_addr: "0.0.0.0:5001".to_string(),
            log_file: PathBuf::from("parking.log"),
        }
    }
}

impl Config {
    /// Load `.env` (if any) and then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let rows = parse_var(&lookup, "PARKING_ROWS", defaults.layout.rows)?;
        let columns = parse_var(&lookup, "PARKING_COLUMNS", defaults.layout.columns)?;
        if rows == 0 || columns == 0 {
            bail!("PARKING_ROWS and PARKING_COLUMNS must both be at least 1");
        }

        let rate_per_minute = parse_var(&lookup, "PARKING_RATE_PER_MINUTE", defaults.rate_per_minute)?;
        if !rate_per_minute.is_finite() || rate_per_minute < 0.0 {
            bail!("PARKING_RATE_PER_MINUTE must be a non-negative number");
        }

        Ok(Config {
            database_path: lookup("PARKING_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            layout: LotLayout::new(rows, columns),
            rate_per_minute,
            bind_addr: lookup("PARKING_BIND_ADDR").unwrap_or(defaults.bind_addr),
            log_file: lookup("PARKING_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_file),
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
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
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.layout, LotLayout::new(4, 5));
        assert_eq!(config.rate_per_minute, 15.0);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PARKING_DB_PATH", "/tmp/lot.db"),
            ("PARKING_ROWS", "3"),
            ("PARKING_COLUMNS", " 8 "),
            ("PARKING_RATE_PER_MINUTE", "0.25"),
            ("PARKING_BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/lot.db"));
        assert_eq!(config.layout, LotLayout::new(3, 8));
        assert_eq!(config.rate_per_minute, 0.25);
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup_from(&[("PARKING_ROWS", "four")])).unwrap_err();
        assert!(err.to_string().contains("PARKING_ROWS"));

        assert!(Config::from_lookup(lookup_from(&[("PARKING_COLUMNS", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("PARKING_RATE_PER_MINUTE", "-1")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("PARKING_RATE_PER_MINUTE", "NaN")])).is_err());
    }
}
