//! Typed configuration from a TOML file and environment variables.
//!
//! Loads once at startup. The connection string is wrapped in
//! `secrecy::SecretString` so credentials never reach the logs.

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Seconds to wait for a connection or a lock before giving up.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug)]
pub struct Config {
    pub database: DatabaseConfig,
    pub log_level: String,
    pub otel_endpoint: Option<String>,
}

/// Everything `Store::open` needs to resolve and tune a connection.
#[derive(Debug)]
pub struct DatabaseConfig {
    /// Configured connection string. Used when no explicit DSN is passed.
    pub connection: Option<SecretString>,
    /// Acquire/lock timeout in seconds.
    pub timeout: u64,
    pub max_connections: u32,
    /// Log every SQL statement. Off by default.
    pub echo: bool,
    /// Installation root. The default SQLite file lives at `<root>/db/sandq.db`.
    pub root: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            echo: false,
            root: PathBuf::from("."),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            log_level: "info".to_string(),
            otel_endpoint: None,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    database: FileDatabase,
    log_level: Option<String>,
    otel_endpoint: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileDatabase {
    connection: Option<String>,
    timeout: Option<u64>,
    max_connections: Option<u32>,
    echo: Option<bool>,
    root: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {e}")))?;

        let defaults = DatabaseConfig::default();
        Ok(Self {
            database: DatabaseConfig {
                connection: file.database.connection.map(SecretString::from),
                timeout: file.database.timeout.unwrap_or(defaults.timeout),
                max_connections: file
                    .database
                    .max_connections
                    .unwrap_or(defaults.max_connections),
                echo: file.database.echo.unwrap_or(defaults.echo),
                root: file.database.root.unwrap_or(defaults.root),
            },
            log_level: file.log_level.unwrap_or_else(|| "info".to_string()),
            otel_endpoint: file.otel_endpoint,
        })
    }

    /// File first (when given), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_var("SANDQ_DATABASE_URL").or_else(|| env_var("DATABASE_URL")) {
            self.database.connection = Some(SecretString::from(url));
        }
        if let Some(timeout) = parsed_var::<u64>("SANDQ_DATABASE_TIMEOUT")? {
            self.database.timeout = timeout;
        }
        if let Some(max) = parsed_var::<u32>("SANDQ_MAX_CONNECTIONS")? {
            self.database.max_connections = max;
        }
        if let Some(root) = env_var("SANDQ_ROOT") {
            self.database.root = PathBuf::from(root);
        }
        if let Some(level) = env_var("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(endpoint) = env_var("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(endpoint);
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.parse()
                .map_err(|e| Error::Config(format!("{name}={raw:?} is not valid: {e}")))
        })
        .transpose()
}
