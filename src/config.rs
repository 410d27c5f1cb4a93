use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::ledger::LedgerOptions;

const DEFAULT_JWT_SECRET: &str = "roomledger-dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Server settings, read from `ROOMLEDGER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub rooms_file: Option<PathBuf>,
    pub lock_timeout: Duration,
    pub commit_timeout: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parse = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            parse_var(&lookup, var).map(|v| v.unwrap_or(default))
        };
        Ok(Self {
            bind: lookup("ROOMLEDGER_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_var(&lookup, "ROOMLEDGER_PORT")?.unwrap_or(8080),
            data_dir: lookup("ROOMLEDGER_DATA_DIR")
                .unwrap_or_else(|| "./data".into())
                .into(),
            jwt_secret: lookup("ROOMLEDGER_JWT_SECRET")
                .unwrap_or_else(|| DEFAULT_JWT_SECRET.into()),
            rooms_file: lookup("ROOMLEDGER_ROOMS_FILE").map(PathBuf::from),
            lock_timeout: Duration::from_millis(parse("ROOMLEDGER_LOCK_TIMEOUT_MS", 5_000)?),
            commit_timeout: Duration::from_millis(parse("ROOMLEDGER_COMMIT_TIMEOUT_MS", 5_000)?),
            compact_threshold: parse("ROOMLEDGER_COMPACT_THRESHOLD", 1_000)?,
            metrics_port: parse_var(&lookup, "ROOMLEDGER_METRICS_PORT")?,
        })
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    pub fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            lock_timeout: self.lock_timeout,
            commit_timeout: self.commit_timeout,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roomledger.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
