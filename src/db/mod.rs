//! Persistence engine: connection pool, schema bootstrap, health check.
//!
//! One `Store` wraps a sqlx `AnyPool`, so the same queue runs on an embedded
//! SQLite file or on a PostgreSQL server. The pool is the only shared mutable
//! resource; every operation acquires its own connection or transaction.

pub mod backend;
pub mod guests;
pub mod samples;
pub(crate) mod schema;
pub mod tasks;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::{AnyPool, ConnectOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::fingerprint::{FileHasher, Fingerprinter};

pub use backend::{Backend, ConnectionTarget};

/// Database handle. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Store {
    pool: AnyPool,
    backend: Backend,
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend)
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

impl Store {
    /// Resolve the connection target, connect, and make sure the schema exists.
    ///
    /// `dsn` overrides `config.connection`; with neither, the embedded
    /// database at `<config.root>/db/sandq.db` is used.
    pub async fn open(dsn: Option<&str>, config: &DatabaseConfig) -> Result<Self> {
        let target = backend::resolve(dsn, config)?;
        sqlx::any::install_default_drivers();

        let mut options = AnyConnectOptions::from_str(&target.url).map_err(|e| {
            Error::Config(format!(
                "invalid database URL {}: {e}",
                backend::redact(&target.url)
            ))
        })?;
        if !config.echo {
            options = options.disable_statement_logging();
        }

        let timeout = Duration::from_secs(config.timeout);
        let busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let backend = target.backend;

        let mut pool_options = AnyPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    for pragma in schema::connection_pragmas(backend, busy_timeout_ms) {
                        sqlx::query(&pragma).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            });
        if target.is_memory() {
            // Each in-memory connection would see its own empty database.
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            Error::StoreInit(format!(
                "unable to connect to {} database: {e}",
                backend.name()
            ))
        })?;

        let store = Self {
            pool,
            backend,
            fingerprinter: Arc::new(FileHasher),
        };
        store.migrate().await?;

        info!(
            backend = backend.name(),
            timeout_secs = config.timeout,
            "store opened"
        );
        Ok(store)
    }

    /// Open an explicit connection string with default settings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::open(Some(url), &DatabaseConfig::default()).await
    }

    /// Replace the fingerprinting collaborator used by `enqueue_file`.
    pub fn with_fingerprinter(mut self, fingerprinter: impl Fingerprinter + 'static) -> Self {
        self.fingerprinter = Arc::new(fingerprinter);
        self
    }

    /// Create tables and indexes that do not exist yet.
    async fn migrate(&self) -> Result<()> {
        let init_err = |e: sqlx::Error| Error::StoreInit(format!("unable to create schema: {e}"));

        let mut tx = self.pool.begin().await.map_err(init_err)?;
        for statement in schema::statements(self.backend) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(init_err)?;
        }
        tx.commit().await.map_err(init_err)?;
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Release every pooled connection. Safe to call more than once.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub(crate) fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

// Timestamps are stored as fixed-width RFC 3339 text so they compare
// correctly as strings on every backend.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("invalid timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_as_text() {
        let earlier = DateTime::parse_from_rfc3339("2026-01-01T09:59:59.999999Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(format_ts(earlier) < format_ts(later));
        assert_eq!(format_ts(later), "2026-01-01T10:00:00.000000Z");
    }

    #[test]
    fn timestamps_survive_storage_format() {
        let now = parse_ts(&format_ts(Utc::now())).unwrap();
        assert_eq!(parse_ts(&format_ts(now)).unwrap(), now);
        assert!(parse_ts("yesterday").is_err());
    }
}
