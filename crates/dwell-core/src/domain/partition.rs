//! Partition keys and the cache key layout.
//!
//! A partition is `{task_type}_{priority}`. Each partition owns two cache
//! structures:
//! - `READY:{partition}`: list of tasks eligible for immediate delivery
//! - `FUTURE:{partition}`: sorted set of tasks scored by execute time

use std::fmt;
use std::str::FromStr;

pub const READY_PREFIX: &str = "READY:";
pub const FUTURE_PREFIX: &str = "FUTURE:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub task_type: i32,
    pub priority: i32,
}

impl PartitionKey {
    pub fn new(task_type: i32, priority: i32) -> Self {
        Self {
            task_type,
            priority,
        }
    }

    pub fn ready_key(&self) -> String {
        format!("{READY_PREFIX}{self}")
    }

    pub fn future_key(&self) -> String {
        format!("{FUTURE_PREFIX}{self}")
    }

    /// Recover the partition from a `FUTURE:` key.
    pub fn from_future_key(key: &str) -> Option<Self> {
        key.strip_prefix(FUTURE_PREFIX)?.parse().ok()
    }

    /// Recover the partition from a `READY:` key.
    pub fn from_ready_key(key: &str) -> Option<Self> {
        key.strip_prefix(READY_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.task_type, self.priority)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid partition key: {0}")]
pub struct ParsePartitionError(String);

impl FromStr for PartitionKey {
    type Err = ParsePartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Types and priorities may be negative, so split on the last '_'.
        let invalid = || ParsePartitionError(s.to_string());
        let (task_type, priority) = s.rsplit_once('_').ok_or_else(invalid)?;
        Ok(Self {
            task_type: task_type.parse().map_err(|_| invalid())?,
            priority: priority.parse().map_err(|_| invalid())?,
        })
    }
}
