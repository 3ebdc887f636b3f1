//! # sandq
//!
//! Persistent analysis task queue.
//!
//! Stores submitted files and URLs as tasks, deduplicates file content into
//! samples by hash, hands tasks to workers one at a time in priority/age
//! order, and records the guest that ran each task. Runs on an embedded
//! SQLite file or on PostgreSQL.

pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod telemetry;

pub use db::Store;
pub use error::{Error, Result};
