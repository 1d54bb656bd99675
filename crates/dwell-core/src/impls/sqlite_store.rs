//! SqliteTaskStore - relational durable store.
//!
//! Tables:
//! - `taskinfo`: active rows (deleted on EXECUTED/CANCELLED)
//! - `taskinfo_logs`: audit rows, status and version updated in place
//!
//! The connection sits behind a std `Mutex` and every call runs on the
//! blocking pool, so the async runtime never waits on disk I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::domain::{NewTask, Task, TaskId, TaskLogRecord, TaskStatus};
use crate::ports::{Clock, IdGenerator, StoreError, TaskStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS taskinfo (
    task_id      TEXT PRIMARY KEY,
    task_type    INTEGER NOT NULL,
    priority     INTEGER NOT NULL,
    execute_time INTEGER NOT NULL,   -- epoch millis
    parameters   BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_taskinfo_execute_time ON taskinfo (execute_time);

CREATE TABLE IF NOT EXISTS taskinfo_logs (
    task_id      TEXT PRIMARY KEY,
    task_type    INTEGER NOT NULL,
    priority     INTEGER NOT NULL,
    execute_time INTEGER NOT NULL,
    parameters   BLOB NOT NULL,
    status       INTEGER NOT NULL,   -- 0 scheduled, 1 executed, 2 cancelled
    version      INTEGER NOT NULL,
    created_at   INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL
);
";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(err.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl SqliteTaskStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(
        path: impl AsRef<Path>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, ids, clock)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory(
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, ids, clock)
    }

    fn with_connection(
        conn: Connection,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ids,
            clock,
        })
    }

    /// Run `f` with exclusive access to the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }
}

fn millis_to_datetime(task_id: &str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::Corrupt {
            task_id: task_id.to_string(),
            reason: format!("timestamp out of range: {millis}"),
        })
}

/// Columns: task_id, task_type, priority, execute_time, parameters.
struct RawTask {
    task_id: String,
    task_type: i32,
    priority: i32,
    execute_time: i64,
    parameters: Vec<u8>,
}

impl RawTask {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task_id: row.get(0)?,
            task_type: row.get(1)?,
            priority: row.get(2)?,
            execute_time: row.get(3)?,
            parameters: row.get(4)?,
        })
    }

    fn into_task(self) -> Result<Task, StoreError> {
        let task_id = self.task_id.parse::<TaskId>().map_err(|e| StoreError::Corrupt {
            task_id: self.task_id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Task {
            task_id,
            task_type: self.task_type,
            priority: self.priority,
            execute_time: millis_to_datetime(&self.task_id, self.execute_time)?,
            parameters: self.parameters,
        })
    }
}

fn read_log(conn: &Connection, task_id: &str) -> Result<Option<TaskLogRecord>, StoreError> {
    let row = conn
        .query_row(
            "SELECT task_id, task_type, priority, execute_time, parameters,
                    status, version, created_at, updated_at
             FROM taskinfo_logs WHERE task_id = ?1",
            params![task_id],
            |row| {
                Ok((
                    RawTask::from_row(row)?,
                    row.get::<_, i32>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((raw, status, version, created_at, updated_at)) = row else {
        return Ok(None);
    };
    let status = TaskStatus::from_code(status).ok_or_else(|| StoreError::Corrupt {
        task_id: task_id.to_string(),
        reason: format!("unknown status code {status}"),
    })?;
    Ok(Some(TaskLogRecord {
        task: raw.into_task()?,
        status,
        version,
        created_at: millis_to_datetime(task_id, created_at)?,
        updated_at: millis_to_datetime(task_id, updated_at)?,
    }))
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = task.into_task(self.ids.generate_task_id());
        let now = self.clock.now_millis();

        let row = task.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let id = row.task_id.as_ulid().to_string();
            tx.execute(
                "INSERT INTO taskinfo (task_id, task_type, priority, execute_time, parameters)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, row.task_type, row.priority, row.score(), row.parameters],
            )?;
            tx.execute(
                "INSERT INTO taskinfo_logs
                   (task_id, task_type, priority, execute_time, parameters,
                    status, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
                params![
                    id,
                    row.task_type,
                    row.priority,
                    row.score(),
                    row.parameters,
                    TaskStatus::Scheduled.code(),
                    now,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

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
        let now = self.clock.now_millis();

        self.with_conn(move |conn| {
            let id = task_id.as_ulid().to_string();
            let tx = conn.transaction()?;

            let deleted = tx.execute("DELETE FROM taskinfo WHERE task_id = ?1", params![id])?;
            if deleted == 0 {
                // nothing scheduled under this id; leave the log as it is
                return Ok(None);
            }
            let updated = tx.execute(
                "UPDATE taskinfo_logs
                 SET status = ?2, version = version + 1, updated_at = ?3
                 WHERE task_id = ?1",
                params![id, status.code(), now],
            )?;
            if updated == 0 {
                return Err(StoreError::Corrupt {
                    task_id: id,
                    reason: "active row without log row".into(),
                });
            }
            let log = read_log(&tx, &id)?;
            tx.commit()?;
            Ok(log)
        })
        .await
    }

    async fn list_due_before(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let before = before.timestamp_millis();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT task_id, task_type, priority, execute_time, parameters
                 FROM taskinfo WHERE execute_time < ?1
                 ORDER BY execute_time, task_id",
            )?;
            let rows = stmt.query_map(params![before], RawTask::from_row)?;
            let mut tasks = Vec::new();
            for raw in rows {
                tasks.push(raw?.into_task()?);
            }
            Ok(tasks)
        })
        .await
    }

    async fn get_log(&self, task_id: TaskId) -> Result<Option<TaskLogRecord>, StoreError> {
        self.with_conn(move |conn| read_log(conn, &task_id.as_ulid().to_string()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ManualClock, UlidGenerator};
    use chrono::Duration;
    use tempfile::TempDir;

    fn fixtures() -> (Arc<dyn IdGenerator>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::new(clock.clone())));
        (ids, clock)
    }

    #[tokio::test]
    async fn create_and_read_log() {
        let (ids, clock) = fixtures();
        let store = SqliteTaskStore::open_in_memory(ids, Arc::new(clock.clone())).unwrap();

        let task = store
            .create(NewTask::new(1, 5, clock.now()).with_parameters(vec![0, 1, 2, 255]))
            .await
            .unwrap();

        let log = store.get_log(task.task_id).await.unwrap().unwrap();
        assert_eq!(log.task, task);
        assert_eq!(log.status, TaskStatus::Scheduled);
        assert_eq!(log.version, 1);
        assert_eq!(log.created_at, clock.now());
    }

    #[tokio::test]
    async fn complete_deletes_active_row_and_bumps_version() {
        let (ids, clock) = fixtures();
        let store = SqliteTaskStore::open_in_memory(ids, Arc::new(clock.clone())).unwrap();
        let task = store.create(NewTask::new(1, 5, clock.now())).await.unwrap();

        clock.advance(Duration::seconds(10));
        let log = store
            .complete(task.task_id, TaskStatus::Cancelled)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.status, TaskStatus::Cancelled);
        assert_eq!(log.version, 2);
        assert_eq!(log.updated_at, clock.now());

        assert!(store.list_due_before(clock.now() + Duration::days(1)).await.unwrap().is_empty());
        assert!(store
            .complete(task.task_id, TaskStatus::Executed)
            .await
            .unwrap()
            .is_none());

        let log = store.get_log(task.task_id).await.unwrap().unwrap();
        assert_eq!(log.status, TaskStatus::Cancelled);
        assert_eq!(log.version, 2);
    }

    #[tokio::test]
    async fn list_due_before_filters_and_orders() {
        let (ids, clock) = fixtures();
        let store = SqliteTaskStore::open_in_memory(ids, Arc::new(clock.clone())).unwrap();
        let now = clock.now();

        let within = store
            .create(NewTask::new(1, 1, now + Duration::minutes(2)))
            .await
            .unwrap();
        let past = store
            .create(NewTask::new(2, 1, now - Duration::minutes(2)))
            .await
            .unwrap();
        store
            .create(NewTask::new(1, 1, now + Duration::minutes(10)))
            .await
            .unwrap();

        let due = store.list_due_before(now + Duration::minutes(5)).await.unwrap();
        assert_eq!(due, vec![past, within]);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dwell.db");
        let (ids, clock) = fixtures();

        let task = {
            let store = SqliteTaskStore::open(&path, ids.clone(), Arc::new(clock.clone())).unwrap();
            store.create(NewTask::new(3, 2, clock.now())).await.unwrap()
        };

        let store = SqliteTaskStore::open(&path, ids, Arc::new(clock.clone())).unwrap();
        let due = store.list_due_before(clock.now() + Duration::seconds(1)).await.unwrap();
        assert_eq!(due, vec![task]);
    }
}
