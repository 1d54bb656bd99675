//! Domain model: ids, tasks, partitions, errors.

pub mod errors;
pub mod ids;
pub mod partition;
pub mod task;

pub use self::errors::{Result, SchedulerError};
pub use self::ids::{LeaseToken, TaskId};
pub use self::partition::{FUTURE_PREFIX, PartitionKey, READY_PREFIX};
pub use self::task::{NewTask, Task, TaskLogRecord, TaskStatus};
