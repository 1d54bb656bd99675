//! InMemoryTaskStore - development/test store.
//!
//! Same transactional contract as the SQLite store: every method takes the
//! state lock once, so create and complete are all-or-nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{NewTask, Task, TaskId, TaskLogRecord, TaskStatus};
use crate::ports::{Clock, IdGenerator, StoreError, TaskStore};

#[derive(Default)]
struct StoreState {
    /// Active rows (SCHEDULED only).
    active: HashMap<TaskId, Task>,
    /// Log rows (all tasks ever created).
    logs: HashMap<TaskId, TaskLogRecord>,
}

pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryTaskStore {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            ids,
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        let task_id = self.ids.generate_task_id();
        if state.logs.contains_key(&task_id) {
            return Err(StoreError::Constraint(format!("duplicate task id {task_id}")));
        }

        let task = task.into_task(task_id);
        let log = TaskLogRecord::scheduled(task.clone(), self.clock.now());
        state.active.insert(task_id, task.clone());
        state.logs.insert(task_id, log);
        Ok(task)
    }

    async fn complete(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<Option<TaskLogRecord>, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidTransition(status));
        }
        self.check_available()?;
        let mut state = self.state.lock().await;

        if state.active.remove(&task_id).is_none() {
            return Ok(None);
        }
        let now = self.clock.now();
        let Some(log) = state.logs.get_mut(&task_id) else {
            return Err(StoreError::Corrupt {
                task_id: task_id.to_string(),
                reason: "active row without log row".into(),
            });
        };
        log.transition(status, now);
        Ok(Some(log.clone()))
    }

    async fn list_due_before(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;

        let mut due: Vec<Task> = state
            .active
            .values()
            .filter(|task| task.execute_time < before)
            .cloned()
            .collect();
        due.sort_by_key(|task| (task.execute_time, task.task_id));
        Ok(due)
    }

    async fn get_log(&self, task_id: TaskId) -> Result<Option<TaskLogRecord>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.logs.get(&task_id).cloned())
    }
}
