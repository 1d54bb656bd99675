//! Task model: submission, staged task, log record.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ids::TaskId;
use super::partition::PartitionKey;

/// Task lifecycle status as recorded in the task log.
///
/// State transitions:
/// - Scheduled -> Executed (poll)
/// - Scheduled -> Cancelled (cancel)
///
/// Both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Scheduled,
    Executed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Executed | TaskStatus::Cancelled)
    }

    /// Numeric code used by the relational schema.
    pub fn code(self) -> i32 {
        match self {
            TaskStatus::Scheduled => 0,
            TaskStatus::Executed => 1,
            TaskStatus::Cancelled => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Scheduled),
            1 => Some(TaskStatus::Executed),
            2 => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

/// A task as submitted by a producer. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub task_type: i32,
    pub priority: i32,
    /// The task must not run before this instant. A past value means "now".
    pub execute_time: DateTime<Utc>,
    /// Opaque payload, never inspected by the scheduler.
    pub parameters: Vec<u8>,
}

impl NewTask {
    pub fn new(task_type: i32, priority: i32, execute_time: DateTime<Utc>) -> Self {
        Self {
            task_type,
            priority,
            execute_time,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<u8>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Attach the store-assigned id.
    pub fn into_task(self, task_id: TaskId) -> Task {
        Task {
            task_id,
            task_type: self.task_type,
            priority: self.priority,
            execute_time: self.execute_time,
            parameters: self.parameters,
        }
    }
}

/// A persisted task.
///
/// Only the immutable fields live here, so the serialized form staged in the
/// cache is a function of the task identity: two encodings of the same task
/// are byte-equal, which is what value-matched cache removal relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub task_type: i32,
    pub priority: i32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub execute_time: DateTime<Utc>,
    #[serde(with = "base64_bytes")]
    pub parameters: Vec<u8>,
}

impl Task {
    pub fn partition(&self) -> PartitionKey {
        PartitionKey::new(self.task_type, self.priority)
    }

    /// Epoch milliseconds, used as the future-set score.
    pub fn score(&self) -> i64 {
        self.execute_time.timestamp_millis()
    }

    /// Serialized form stored in ready lists and future sets.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// The audit row of a task. Exists for the task's whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLogRecord {
    pub task: Task,
    pub status: TaskStatus,
    /// 1 on creation, incremented on every transition.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskLogRecord {
    pub fn scheduled(task: Task, now: DateTime<Utc>) -> Self {
        Self {
            task,
            status: TaskStatus::Scheduled,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a terminal transition.
    pub fn transition(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.status = status;
        self.version += 1;
        self.updated_at = now;
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
