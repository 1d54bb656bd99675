//! TaskStore port - the durable source of truth.
//!
//! Two record families:
//! - active rows: one per task while it is `SCHEDULED`
//! - task log: one row per task for its whole lifetime, never deleted
//!
//! # Design
//! - create writes both rows in one transaction and assigns the id
//! - complete deletes the active row and updates the log row in one
//!   transaction, and only if the active row still exists
//! - the staging cache can always be rebuilt from `list_due_before`

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{NewTask, Task, TaskId, TaskLogRecord, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("{0:?} is not a terminal status")]
    InvalidTransition(TaskStatus),

    #[error("corrupt row for {task_id}: {reason}")]
    Corrupt { task_id: String, reason: String },
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task (active row + log row with version 1).
    async fn create(&self, task: NewTask) -> Result<Task, StoreError>;

    /// Move a scheduled task to a terminal status.
    ///
    /// Returns `Ok(None)` when the task has no active row (unknown, or
    /// already executed/cancelled); the log row is left untouched then.
    async fn complete(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<Option<TaskLogRecord>, StoreError>;

    /// Active tasks with `execute_time < before`, earliest first.
    async fn list_due_before(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError>;

    async fn get_log(&self, task_id: TaskId) -> Result<Option<TaskLogRecord>, StoreError>;
}
