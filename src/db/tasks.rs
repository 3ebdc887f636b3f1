//! Task lifecycle: enqueue, atomic claim, completion, and the read-only
//! query surface used by inspection tools.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use sqlx::AnyConnection;
use tracing::{debug, info};

use super::backend::Backend;
use super::samples::insert_or_get_sample_on;
use super::{format_ts, parse_ts};
use crate::error::{Error, Result};
use crate::model::*;
use crate::telemetry::metrics;

/// Claim attempts before giving up with `Error::Busy`.
const CLAIM_ATTEMPTS: u32 = 10;

const TASK_SELECT: &str = "SELECT t.id, t.target, t.category, t.timeout, t.priority,
        t.custom, t.machine, t.package, t.options, t.platform,
        t.added_on, t.completed_on, t.status, t.sample_id, g.id AS guest_id
     FROM tasks t LEFT JOIN guests g ON g.task_id = t.id";

const CLAIM_ORDER: &str = "priority DESC, added_on ASC, id ASC";

/// Single-statement claim. The outer `status = 'pending'` re-check makes a
/// lost race update zero rows instead of claiming twice.
fn claim_sql(backend: Backend) -> String {
    let lock = match backend {
        Backend::Postgres => " FOR UPDATE SKIP LOCKED",
        Backend::Sqlite => "",
    };
    format!(
        "UPDATE tasks SET status = 'processing'
         WHERE id = (
             SELECT id FROM tasks WHERE status = 'pending'
             ORDER BY {CLAIM_ORDER} LIMIT 1{lock}
         )
         AND status = 'pending'
         RETURNING id"
    )
}

/// Validate a state transition, returning an error if disallowed.
fn validate_transition(from: Status, to: Status) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

impl super::Store {
    /// Submit a file. Fingerprints it, dedups the sample, then queues a task
    /// that references the sample.
    pub async fn enqueue_file(&self, path: impl AsRef<Path>, opts: &TaskOptions) -> Result<TaskId> {
        let path = path.as_ref().to_path_buf();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(Error::NotFound(format!("{} is not a file", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("file {}", path.display())));
            }
            Err(e) => return Err(e.into()),
        }

        // Hash outside of any transaction.
        let fingerprinter = Arc::clone(&self.fingerprinter);
        let hash_path = path.clone();
        let info = tokio::task::spawn_blocking(move || fingerprinter.fingerprint(&hash_path))
            .await
            .map_err(|e| Error::Other(format!("fingerprint task failed: {e}")))??;

        let sample = NewSample::from(info);
        let target = path.to_string_lossy().into_owned();

        let mut tx = self.pool().begin().await?;
        let sample_id = insert_or_get_sample_on(&mut tx, &sample).await?;
        let id = insert_task_on(&mut tx, &target, Category::File, Some(sample_id), opts).await?;
        tx.commit().await?;

        log_enqueued(id, Category::File, opts);
        Ok(id)
    }

    /// Submit a URL.
    pub async fn enqueue_url(&self, url: &str, opts: &TaskOptions) -> Result<TaskId> {
        let mut conn = self.pool().acquire().await?;
        let id = insert_task_on(&mut conn, url, Category::Url, None, opts).await?;
        log_enqueued(id, Category::Url, opts);
        Ok(id)
    }

    pub async fn enqueue(&self, target: &Target, opts: &TaskOptions) -> Result<TaskId> {
        match target {
            Target::File(path) => self.enqueue_file(path, opts).await,
            Target::Url(url) => self.enqueue_url(url, opts).await,
        }
    }

    /// Claim the highest-priority, oldest pending task.
    ///
    /// `Ok(None)` means nothing is pending. A lost race is retried; if every
    /// attempt loses, or the store stays locked past its timeout, the result
    /// is `Error::Busy`.
    pub async fn claim_next(&self) -> Result<Option<Task>> {
        for attempt in 1..=CLAIM_ATTEMPTS {
            match self.try_claim().await {
                Ok(Some(task)) => {
                    metrics::tasks_claimed().add(1, &[]);
                    info!(task_id = %task.id, priority = task.priority, "task claimed");
                    return Ok(Some(task));
                }
                Ok(None) => {
                    if self.count_tasks(Some(Status::Pending)).await? == 0 {
                        return Ok(None);
                    }
                    debug!(attempt, "claim lost a race");
                }
                // The store already waited out its lock timeout.
                Err(e) => return Err(e),
            }
            metrics::claim_retries().add(1, &[]);
            tokio::time::sleep(Duration::from_millis(5 * u64::from(attempt))).await;
        }

        Err(Error::Busy(format!(
            "no task claimed after {CLAIM_ATTEMPTS} attempts"
        )))
    }

    /// One claim attempt. The snapshot is read inside the claiming transaction
    /// and only returned after the commit succeeds.
    async fn try_claim(&self) -> Result<Option<Task>> {
        let mut tx = self.pool().begin().await?;

        let claimed: Option<(i64,)> = sqlx::query_as(&claim_sql(self.backend()))
            .fetch_optional(&mut *tx)
            .await?;
        let Some((id,)) = claimed else {
            return Ok(None);
        };

        let task = fetch_task_on(&mut tx, TaskId(id))
            .await?
            .ok_or_else(|| Error::Other(format!("claimed task {id} disappeared")))?;
        tx.commit().await?;
        Ok(Some(task))
    }

    /// The task `claim_next` would take, without claiming it.
    pub async fn peek_next(&self) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "{TASK_SELECT} WHERE t.status = 'pending'
             ORDER BY t.priority DESC, t.added_on ASC, t.id ASC LIMIT 1"
        ))
        .fetch_optional(self.pool())
        .await?;

        row.map(TaskRow::try_into_task).transpose()
    }

    /// Claim one specific task: pending → processing.
    pub async fn mark_processing(&self, id: TaskId) -> Result<Task> {
        let task = self.transition(id, Status::Pending, Status::Processing).await?;
        metrics::tasks_claimed().add(1, &[]);
        info!(task_id = %id, "task marked processing");
        Ok(task)
    }

    /// Finish a processing task. Any other current status is rejected and
    /// leaves the row untouched, so `completed_on` is written exactly once.
    pub async fn complete(&self, id: TaskId, succeeded: bool) -> Result<Task> {
        let to = if succeeded {
            Status::Success
        } else {
            Status::Failure
        };
        let task = self.transition(id, Status::Processing, to).await?;

        metrics::tasks_completed().add(1, &[KeyValue::new("status", to.as_str())]);
        info!(task_id = %id, status = %to, "task completed");
        Ok(task)
    }

    /// Conditional status update. Terminal states also stamp `completed_on`.
    async fn transition(&self, id: TaskId, from: Status, to: Status) -> Result<Task> {
        validate_transition(from, to)?;

        let completed_on = to.is_terminal().then(|| format_ts(Utc::now()));
        let mut tx = self.pool().begin().await?;

        let updated: Option<(i64,)> = sqlx::query_as(
            "UPDATE tasks SET status = $1, completed_on = COALESCE($2, completed_on)
             WHERE id = $3 AND status = $4
             RETURNING id",
        )
        .bind(to.as_str())
        .bind(completed_on)
        .bind(id.0)
        .bind(from.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            let current = fetch_task_on(&mut tx, id).await?;
            return Err(match current {
                None => Error::NotFound(format!("task {id}")),
                Some(task) => Error::InvalidTransition {
                    from: task.status,
                    to,
                },
            });
        }

        let task = fetch_task_on(&mut tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        tx.commit().await?;
        Ok(task)
    }

    /// Get a task by id.
    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let mut conn = self.pool().acquire().await?;
        fetch_task_on(&mut conn, id).await
    }

    /// Most recently added tasks first.
    pub async fn list_tasks(&self, limit: Option<i64>) -> Result<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT} ORDER BY t.added_on DESC, t.id DESC");
        if limit.is_some() {
            sql.push_str(" LIMIT $1");
        }

        let mut query = sqlx::query_as::<sqlx::Any, TaskRow>(&sql);
        if let Some(limit) = limit {
            query = query.bind(limit.max(0));
        }
        let rows = query.fetch_all(self.pool()).await?;

        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    pub async fn list_tasks_by_status(&self, status: Status, limit: Option<i64>) -> Result<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT} WHERE t.status = $1 ORDER BY t.added_on DESC, t.id DESC");
        if limit.is_some() {
            sql.push_str(" LIMIT $2");
        }

        let mut query = sqlx::query_as::<sqlx::Any, TaskRow>(&sql).bind(status.as_str());
        if let Some(limit) = limit {
            query = query.bind(limit.max(0));
        }
        let rows = query.fetch_all(self.pool()).await?;

        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    /// Count tasks, optionally only those in one status.
    pub async fn count_tasks(&self, status: Option<Status>) -> Result<i64> {
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = $1")
                    .bind(status.as_str())
                    .fetch_one(self.pool())
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
                    .fetch_one(self.pool())
                    .await?
            }
        };
        Ok(count)
    }
}

async fn insert_task_on(
    conn: &mut AnyConnection,
    target: &str,
    category: Category,
    sample_id: Option<SampleId>,
    opts: &TaskOptions,
) -> Result<TaskId> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO tasks (target, category, timeout, priority, custom, machine, package,
                            options, platform, added_on, status, sample_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11)
         RETURNING id",
    )
    .bind(target)
    .bind(category.as_str())
    .bind(opts.timeout)
    .bind(opts.priority)
    .bind(&opts.custom)
    .bind(&opts.machine)
    .bind(&opts.package)
    .bind(&opts.options)
    .bind(&opts.platform)
    .bind(format_ts(Utc::now()))
    .bind(sample_id.map(|s| s.0))
    .fetch_one(conn)
    .await?;

    Ok(TaskId(id))
}

fn log_enqueued(id: TaskId, category: Category, opts: &TaskOptions) {
    metrics::tasks_enqueued().add(1, &[KeyValue::new("category", category.as_str())]);
    info!(task_id = %id, %category, priority = opts.priority, "task enqueued");
}

async fn fetch_task_on(conn: &mut AnyConnection, id: TaskId) -> Result<Option<Task>> {
    let row: Option<TaskRow> = sqlx::query_as(&format!("{TASK_SELECT} WHERE t.id = $1"))
        .bind(id.0)
        .fetch_optional(conn)
        .await?;

    row.map(TaskRow::try_into_task).transpose()
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    target: String,
    category: String,
    timeout: i64,
    priority: i64,
    custom: Option<String>,
    machine: Option<String>,
    package: Option<String>,
    options: Option<String>,
    platform: Option<String>,
    added_on: String,
    completed_on: Option<String>,
    status: String,
    sample_id: Option<i64>,
    guest_id: Option<i64>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            target: self.target,
            category: self.category.parse()?,
            timeout: self.timeout,
            priority: self.priority,
            custom: self.custom,
            machine: self.machine,
            package: self.package,
            options: self.options,
            platform: self.platform,
            added_on: parse_ts(&self.added_on)?,
            completed_on: self.completed_on.as_deref().map(parse_ts).transpose()?,
            status: self.status.parse()?,
            sample_id: self.sample_id.map(SampleId),
            guest_id: self.guest_id.map(GuestId),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_postgres_claims_skip_locked_rows() {
        assert!(claim_sql(Backend::Postgres).contains("FOR UPDATE SKIP LOCKED"));
        assert!(!claim_sql(Backend::Sqlite).contains("FOR UPDATE"));
        assert!(claim_sql(Backend::Sqlite).contains("ORDER BY priority DESC, added_on ASC, id ASC"));
    }

    #[test]
    fn completion_requires_processing() {
        assert!(validate_transition(Status::Processing, Status::Success).is_ok());
        assert!(matches!(
            validate_transition(Status::Pending, Status::Success),
            Err(Error::InvalidTransition {
                from: Status::Pending,
                to: Status::Success
            })
        ));
    }
}
