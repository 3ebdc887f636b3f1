//! Core data model.
//!
//! A task is one analysis target (a file or a URL) moving through the queue.
//! Files are backed by a deduplicated sample; each run of a task in a sandbox
//! is tracked as a guest.

pub mod guest;
pub mod sample;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use guest::{Guest, GuestId};
pub use sample::{FileHashes, FileInfo, NewSample, Sample, SampleId};

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of analysis work, as stored in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// File path or URL under analysis.
    pub target: String,

    pub category: Category,

    /// Analysis timeout in seconds. 0 lets the executor pick.
    pub timeout: i64,

    /// Higher claims first.
    pub priority: i64,

    pub custom: Option<String>,
    pub machine: Option<String>,
    pub package: Option<String>,
    pub options: Option<String>,
    pub platform: Option<String>,

    pub added_on: DateTime<Utc>,
    pub completed_on: Option<DateTime<Utc>>,

    pub status: Status,

    /// Content record for file tasks. None for URLs.
    pub sample_id: Option<SampleId>,

    /// The guest run linked to this task, if one was started.
    pub guest_id: Option<GuestId>,
}

/// Store-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Finished without error. Terminal.
    Success,
    /// Finished with an error. Terminal.
    Failure,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Processing) | (Processing, Success) | (Processing, Failure)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Success => "success",
            Status::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "success" => Ok(Status::Success),
            "failure" => Ok(Status::Failure),
            _ => Err(crate::error::Error::Other(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Category / Target
// ---------------------------------------------------------------------------

/// Kind of object a task analyzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    File,
    Url,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::File => "file",
            Category::Url => "url",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Category::File),
            "url" => Ok(Category::Url),
            _ => Err(crate::error::Error::Other(format!("unknown category: {s}"))),
        }
    }
}

/// Something that can be submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    Url(String),
}

impl Target {
    pub fn category(&self) -> Category {
        match self {
            Target::File(_) => Category::File,
            Target::Url(_) => Category::Url,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Per-task metadata supplied at submission. Opaque to the queue apart from
/// `priority`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub(crate) timeout: i64,
    pub(crate) priority: i64,
    pub(crate) package: Option<String>,
    pub(crate) options: Option<String>,
    pub(crate) custom: Option<String>,
    pub(crate) machine: Option<String>,
    pub(crate) platform: Option<String>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            timeout: 0,
            priority: 1,
            package: None,
            options: None,
            custom: None,
            machine: None,
            platform: None,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, seconds: i64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn custom(mut self, custom: impl Into<String>) -> Self {
        self.custom = Some(custom.into());
        self
    }

    pub fn machine(mut self, machine: impl Into<String>) -> Self {
        self.machine = Some(machine.into());
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_edges_are_allowed() {
        use Status::*;
        let all = [Pending, Processing, Success, Failure];
        let allowed = [(Pending, Processing), (Processing, Success), (Processing, Failure)];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states() {
        assert!(Status::Success.is_terminal());
        assert!(Status::Failure.is_terminal());
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Processing.is_terminal());
    }

    #[test]
    fn status_parses_its_own_display() {
        for status in [Status::Pending, Status::Processing, Status::Success, Status::Failure] {
            assert_eq!(status.to_string().parse::<Status>().unwrap(), status);
        }
        assert!("done".parse::<Status>().is_err());
    }

    #[test]
    fn options_default_priority_is_one() {
        let opts = TaskOptions::new();
        assert_eq!(opts.priority, 1);
        assert_eq!(opts.timeout, 0);

        let opts = TaskOptions::new().priority(10).machine("win7-x86").timeout(120);
        assert_eq!(opts.priority, 10);
        assert_eq!(opts.machine.as_deref(), Some("win7-x86"));
        assert_eq!(opts.timeout, 120);
    }

    #[test]
    fn target_category() {
        assert_eq!(Target::File("/tmp/a.exe".into()).category(), Category::File);
        assert_eq!(Target::Url("http://example.com".into()).category(), Category::Url);
    }
}
