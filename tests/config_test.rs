use sandq::Error;
use sandq::config::{Config, DEFAULT_MAX_CONNECTIONS, DEFAULT_TIMEOUT_SECS};
use secrecy::ExposeSecret;
use std::path::Path;

#[test]
fn toml_sets_database_table() {
    let config = Config::from_toml_str(
        r#"
        log_level = "debug"

        [database]
        connection = "postgres://queue:secret@db/queue"
        timeout = 5
        max_connections = 3
        echo = true
        root = "/srv/sandq"
        "#,
    )
    .unwrap();

    assert_eq!(config.log_level, "debug");
    let db = &config.database;
    assert_eq!(
        db.connection.as_ref().map(|c| c.expose_secret()),
        Some("postgres://queue:secret@db/queue")
    );
    assert_eq!(db.timeout, 5);
    assert_eq!(db.max_connections, 3);
    assert!(db.echo);
    assert_eq!(db.root, Path::new("/srv/sandq"));
}

#[test]
fn empty_toml_uses_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config.log_level, "info");
    assert!(config.database.connection.is_none());
    assert_eq!(config.database.timeout, DEFAULT_TIMEOUT_SECS);
    assert_eq!(config.database.max_connections, DEFAULT_MAX_CONNECTIONS);
    assert!(!config.database.echo);
}

#[test]
fn unknown_keys_are_rejected() {
    let err = Config::from_toml_str("[database]\nconection = \"sqlite::memory:\"\n").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn missing_file_is_a_config_error() {
    let err = Config::from_file("/no/such/sandq.toml").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn secret_is_redacted_in_debug_output() {
    let config =
        Config::from_toml_str("[database]\nconnection = \"postgres://u:hunter2@h/db\"\n").unwrap();
    assert!(!format!("{config:?}").contains("hunter2"));
}

// Environment handling lives in one test so nothing else in this binary
// observes the variables mid-flight.
#[test]
fn environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sandq.toml");
    std::fs::write(&path, "[database]\ntimeout = 5\nroot = \"/from/file\"\n").unwrap();

    unsafe {
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("SANDQ_DATABASE_URL", "sqlite::memory:");
        std::env::set_var("SANDQ_DATABASE_TIMEOUT", "9");
        std::env::set_var("SANDQ_ROOT", "");
    }
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(
        config.database.connection.as_ref().map(|c| c.expose_secret()),
        Some("sqlite::memory:")
    );
    assert_eq!(config.database.timeout, 9);
    // Empty values count as unset.
    assert_eq!(config.database.root, Path::new("/from/file"));

    unsafe {
        std::env::set_var("SANDQ_MAX_CONNECTIONS", "lots");
    }
    let err = Config::from_env().unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");

    unsafe {
        std::env::remove_var("SANDQ_DATABASE_URL");
        std::env::remove_var("SANDQ_DATABASE_TIMEOUT");
        std::env::remove_var("SANDQ_ROOT");
        std::env::remove_var("SANDQ_MAX_CONNECTIONS");
    }
}
