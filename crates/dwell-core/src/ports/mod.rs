//! Ports - abstraction layer.
//!
//! Each trait is the seam to an external system. The task manager only
//! talks to these traits; `impls` provides in-memory, SQLite and Redis
//! adapters.
//!
//! # Principles
//! - the relational store is the source of truth
//! - the cache only stages serialized tasks and can be rebuilt at any time
//! - time and ids are injected, never read from ambient state

pub mod clock;
pub mod id_generator;
pub mod lease_lock;
pub mod staging_cache;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::lease_lock::LeaseLock;
pub use self::staging_cache::{CacheError, StagingCache};
pub use self::task_store::{StoreError, TaskStore};
