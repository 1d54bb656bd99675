//! App - the scheduler built from the ports.
//!
//! # Components
//! - **TaskManager**: add / cancel / poll / reload / refresh
//! - **SchedulerLoops**: periodic reload and refresh with graceful shutdown
//! - **PollingConsumer**: per-partition poll loops feeding typed handlers
//! - **status**: staging cache sizes

pub mod consumer;
pub mod scheduler;
pub mod status;
pub mod task_manager;

pub use self::consumer::{PollingConsumer, consume_once};
pub use self::scheduler::SchedulerLoops;
pub use self::status::{PartitionCounts, StagingCounts};
pub use self::task_manager::{Placement, TaskManager};
