use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::limits::DEFAULT_LOCK_TIMEOUT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Process settings, read from `CAMPSITE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    /// WAL appends after which the compactor rewrites the log.
    pub compact_threshold: u64,
    pub lock_timeout: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5480,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            metrics_port: None,
        }
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind: lookup("CAMPSITE_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "CAMPSITE_PORT")?.unwrap_or(defaults.port),
            data_dir: lookup("CAMPSITE_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            max_connections: parsed(&lookup, "CAMPSITE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "CAMPSITE_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            lock_timeout: parsed(&lookup, "CAMPSITE_LOCK_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            metrics_port: parsed(&lookup, "CAMPSITE_METRICS_PORT")?,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("campsite.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
