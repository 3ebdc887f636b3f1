//! Guest run bookkeeping, one guest per task.

use chrono::Utc;
use tracing::{info, warn};

use super::{format_ts, parse_ts};
use crate::error::{Error, Result};
use crate::model::{Guest, GuestId, TaskId};

const GUEST_COLUMNS: &str = "id, name, label, manager, started_on, shutdown_on, task_id";

impl super::Store {
    /// Record that a guest started running `task_id`.
    ///
    /// A single `INSERT ... SELECT` so a missing task inserts nothing, and the
    /// unique `task_id` rejects a second guest without leaving a row behind.
    pub async fn start_guest(
        &self,
        task_id: TaskId,
        name: &str,
        label: &str,
        manager: &str,
    ) -> Result<GuestId> {
        let inserted: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO guests (name, label, manager, started_on, task_id)
             SELECT $1, $2, $3, $4, id FROM tasks WHERE id = $5
             RETURNING id",
        )
        .bind(name)
        .bind(label)
        .bind(manager)
        .bind(format_ts(Utc::now()))
        .bind(task_id.0)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| match Error::from(e) {
            Error::Conflict(_) => Error::Conflict(format!("task {task_id} already has a guest")),
            other => other,
        })?;

        let Some((id,)) = inserted else {
            return Err(Error::NotFound(format!("task {task_id}")));
        };

        info!(guest_id = id, task_id = %task_id, name, manager, "guest started");
        Ok(GuestId(id))
    }

    /// Record guest shutdown. Best effort: an unknown or already stopped
    /// guest is logged and ignored.
    pub async fn stop_guest(&self, guest_id: GuestId) -> Result<()> {
        let affected = sqlx::query(
            "UPDATE guests SET shutdown_on = $1 WHERE id = $2 AND shutdown_on IS NULL",
        )
        .bind(format_ts(Utc::now()))
        .bind(guest_id.0)
        .execute(self.pool())
        .await?
        .rows_affected();

        if affected == 0 {
            warn!(guest_id = %guest_id, "guest stop ignored: unknown or already stopped");
        } else {
            info!(guest_id = %guest_id, "guest stopped");
        }
        Ok(())
    }

    pub async fn get_guest(&self, id: GuestId) -> Result<Option<Guest>> {
        let row: Option<GuestRow> =
            sqlx::query_as(&format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.map(GuestRow::try_into_guest).transpose()
    }

    /// The guest linked to a task, if any.
    pub async fn guest_for_task(&self, task_id: TaskId) -> Result<Option<Guest>> {
        let row: Option<GuestRow> =
            sqlx::query_as(&format!("SELECT {GUEST_COLUMNS} FROM guests WHERE task_id = $1"))
                .bind(task_id.0)
                .fetch_optional(self.pool())
                .await?;

        row.map(GuestRow::try_into_guest).transpose()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct GuestRow {
    id: i64,
    name: String,
    label: String,
    manager: String,
    started_on: String,
    shutdown_on: Option<String>,
    task_id: i64,
}

impl GuestRow {
    fn try_into_guest(self) -> Result<Guest> {
        Ok(Guest {
            id: GuestId(self.id),
            name: self.name,
            label: self.label,
            manager: self.manager,
            started_on: parse_ts(&self.started_on)?,
            shutdown_on: self.shutdown_on.as_deref().map(parse_ts).transpose()?,
            task_id: TaskId(self.task_id),
        })
    }
}
