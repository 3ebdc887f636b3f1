//! Guest run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// One execution of a task inside a sandboxed guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    /// Machine name as known to the manager.
    pub name: String,
    pub label: String,
    /// Virtualization manager that ran the guest (e.g. "virtualbox").
    pub manager: String,
    pub started_on: DateTime<Utc>,
    pub shutdown_on: Option<DateTime<Utc>>,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestId(pub i64);

impl std::fmt::Display for GuestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
