//! IdGenerator port - id allocation.
//!
//! Stores call this when a task is created, so the durable store stays the
//! one place ids are assigned.

use std::sync::Arc;

use crate::domain::ids::{LeaseToken, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_lease_token(&self) -> LeaseToken;
}

/// ULID-based generator.
///
/// The timestamp part comes from the injected clock, so a `FixedClock` gives
/// ids with a deterministic prefix in tests.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_lease_token(&self) -> LeaseToken {
        LeaseToken::from(self.next_ulid())
    }
}
