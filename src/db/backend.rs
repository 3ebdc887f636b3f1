//! Connection target resolution and runtime backend selection.

use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// File name of the default embedded database, under `<root>/db/`.
pub const DEFAULT_DB_FILE: &str = "sandq.db";

/// Database backend, detected from the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    /// Detect the backend from a connection URL or a bare file path.
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Backend::Postgres);
        }
        if url.starts_with("sqlite:") || is_sqlite_path(url) {
            return Ok(Backend::Sqlite);
        }
        Err(Error::Config(format!(
            "unrecognized database URL scheme in {}; expected postgres://, sqlite:// or a file path",
            redact(url)
        )))
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

fn is_sqlite_path(url: &str) -> bool {
    url == ":memory:"
        || url.starts_with('/')
        || url.starts_with("./")
        || url.starts_with("../")
        || url.ends_with(".db")
        || url.ends_with(".sqlite")
        || url.ends_with(".sqlite3")
}

/// A resolved, normalized connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub backend: Backend,
    pub url: String,
}

impl ConnectionTarget {
    /// In-memory SQLite databases are private to one connection.
    pub fn is_memory(&self) -> bool {
        self.backend == Backend::Sqlite
            && (self.url.contains(":memory:") || self.url.contains("mode=memory"))
    }
}

/// Pick the connection target: explicit DSN, then configured DSN, then the
/// default database file under the configured root (creating its directory).
pub fn resolve(dsn: Option<&str>, config: &DatabaseConfig) -> Result<ConnectionTarget> {
    let url = match (dsn, config.connection.as_ref()) {
        (Some(dsn), _) => dsn.trim().to_string(),
        (None, Some(configured)) => configured.expose_secret().trim().to_string(),
        (None, None) => {
            let path = default_db_path(&config.root);
            ensure_parent_dir(&path)?;
            return Ok(ConnectionTarget {
                backend: Backend::Sqlite,
                url: sqlite_file_url(&path),
            });
        }
    };

    if url.is_empty() {
        return Err(Error::Config("database connection string is empty".into()));
    }

    let backend = Backend::from_url(&url)?;
    let url = match backend {
        Backend::Sqlite if url == ":memory:" => "sqlite::memory:".to_string(),
        Backend::Sqlite if !url.starts_with("sqlite:") => sqlite_file_url(Path::new(&url)),
        _ => url,
    };
    Ok(ConnectionTarget { backend, url })
}

pub fn default_db_path(root: &Path) -> PathBuf {
    root.join("db").join(DEFAULT_DB_FILE)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Config(format!(
            "unable to create database directory {}: {e}",
            dir.display()
        ))
    })
}

fn sqlite_file_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

/// Strip credentials so a URL can be shown in errors.
pub(crate) fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
