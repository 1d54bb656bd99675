//! dwell-core
//!
//! Delayed-task scheduling: a durable store is the source of truth, a
//! staging cache holds what is due soon, and consumers poll partitioned
//! ready lists.
//!
//! # Modules
//! - **domain**: ids, tasks, partitions, errors
//! - **ports**: TaskStore, StagingCache, LeaseLock, Clock, IdGenerator
//! - **impls**: in-memory, SQLite and Redis implementations of the ports
//! - **app**: TaskManager, SchedulerLoops, PollingConsumer
//! - **typed**: typed task kinds and handlers
//! - **config**: SchedulerConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

pub use crate::app::{PollingConsumer, SchedulerLoops, TaskManager};
pub use crate::config::SchedulerConfig;
pub use crate::domain::{NewTask, Result, SchedulerError, Task, TaskId, TaskStatus};
