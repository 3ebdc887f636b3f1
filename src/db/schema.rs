//! Table definitions, one statement list per backend.
//!
//! Uniqueness, foreign keys and the completion invariant live here so they
//! hold under concurrent writers, not just in application code. Every
//! statement is `IF NOT EXISTS`; running the list twice is a no-op.

use super::backend::Backend;

const SQLITE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS samples (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        file_size   INTEGER NOT NULL,
        file_type   TEXT,
        md5         TEXT NOT NULL,
        crc32       TEXT NOT NULL,
        sha1        TEXT NOT NULL,
        sha256      TEXT NOT NULL,
        sha512      TEXT NOT NULL,
        ssdeep      TEXT
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS hash_index
        ON samples (md5, crc32, sha1, sha256, sha512)",
    "CREATE TABLE IF NOT EXISTS tasks (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        target          TEXT NOT NULL,
        category        TEXT NOT NULL CHECK (category IN ('file', 'url')),
        timeout         INTEGER NOT NULL DEFAULT 0,
        priority        INTEGER NOT NULL DEFAULT 1,
        custom          TEXT,
        machine         TEXT,
        package         TEXT,
        options         TEXT,
        platform        TEXT,
        added_on        TEXT NOT NULL,
        completed_on    TEXT,
        status          TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'processing', 'success', 'failure')),
        sample_id       INTEGER REFERENCES samples(id),
        CHECK ((status IN ('success', 'failure')) = (completed_on IS NOT NULL))
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_pending
        ON tasks (priority DESC, added_on ASC, id ASC) WHERE status = 'pending'",
    "CREATE INDEX IF NOT EXISTS idx_tasks_added ON tasks (added_on)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_sample ON tasks (sample_id)",
    "CREATE TABLE IF NOT EXISTS guests (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        label       TEXT NOT NULL,
        manager     TEXT NOT NULL,
        started_on  TEXT NOT NULL,
        shutdown_on TEXT,
        task_id     INTEGER NOT NULL UNIQUE REFERENCES tasks(id)
    )",
];

const POSTGRES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS samples (
        id          BIGSERIAL PRIMARY KEY,
        file_size   BIGINT NOT NULL,
        file_type   VARCHAR(255),
        md5         VARCHAR(32) NOT NULL,
        crc32       VARCHAR(8) NOT NULL,
        sha1        VARCHAR(40) NOT NULL,
        sha256      VARCHAR(64) NOT NULL,
        sha512      VARCHAR(128) NOT NULL,
        ssdeep      VARCHAR(255)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS hash_index
        ON samples (md5, crc32, sha1, sha256, sha512)",
    "CREATE TABLE IF NOT EXISTS tasks (
        id              BIGSERIAL PRIMARY KEY,
        target          TEXT NOT NULL,
        category        VARCHAR(255) NOT NULL CHECK (category IN ('file', 'url')),
        timeout         BIGINT NOT NULL DEFAULT 0,
        priority        BIGINT NOT NULL DEFAULT 1,
        custom          VARCHAR(255),
        machine         VARCHAR(255),
        package         VARCHAR(255),
        options         VARCHAR(255),
        platform        VARCHAR(255),
        added_on        TEXT NOT NULL,
        completed_on    TEXT,
        status          VARCHAR(16) NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'processing', 'success', 'failure')),
        sample_id       BIGINT REFERENCES samples(id),
        CHECK ((status IN ('success', 'failure')) = (completed_on IS NOT NULL))
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_pending
        ON tasks (priority DESC, added_on ASC, id ASC) WHERE status = 'pending'",
    "CREATE INDEX IF NOT EXISTS idx_tasks_added ON tasks (added_on)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_sample ON tasks (sample_id)",
    "CREATE TABLE IF NOT EXISTS guests (
        id          BIGSERIAL PRIMARY KEY,
        name        VARCHAR(255) NOT NULL,
        label       VARCHAR(255) NOT NULL,
        manager     VARCHAR(255) NOT NULL,
        started_on  TEXT NOT NULL,
        shutdown_on TEXT,
        task_id     BIGINT NOT NULL UNIQUE REFERENCES tasks(id)
    )",
];

pub(crate) fn statements(backend: Backend) -> &'static [&'static str] {
    match backend {
        Backend::Sqlite => SQLITE,
        Backend::Postgres => POSTGRES,
    }
}

/// Per-connection settings applied right after connecting.
pub(crate) fn connection_pragmas(backend: Backend, busy_timeout_ms: u64) -> Vec<String> {
    match backend {
        Backend::Sqlite => vec![
            format!("PRAGMA busy_timeout = {busy_timeout_ms}"),
            "PRAGMA foreign_keys = ON".to_string(),
            "PRAGMA journal_mode = WAL".to_string(),
        ],
        Backend::Postgres => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_backends_define_the_same_tables() {
        for backend in [Backend::Sqlite, Backend::Postgres] {
            let ddl = statements(backend).join("\n");
            for table in ["samples", "tasks", "guests"] {
                assert!(
                    ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                    "{backend:?} missing {table}"
                );
            }
            assert!(ddl.contains("UNIQUE INDEX IF NOT EXISTS hash_index"));
            assert!(ddl.contains("task_id") && ddl.contains("UNIQUE REFERENCES tasks(id)"));
        }
    }

    #[test]
    fn sqlite_connections_enforce_foreign_keys() {
        let pragmas = connection_pragmas(Backend::Sqlite, 60_000);
        assert!(pragmas.contains(&"PRAGMA foreign_keys = ON".to_string()));
        assert!(pragmas.contains(&"PRAGMA busy_timeout = 60000".to_string()));
        assert!(connection_pragmas(Backend::Postgres, 60_000).is_empty());
    }
}
