//! Status - staging cache sizes per partition.

use serde::{Deserialize, Serialize};

use crate::domain::PartitionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCounts {
    pub task_type: i32,
    pub priority: i32,
    pub ready: usize,
    pub future: usize,
}

impl PartitionCounts {
    pub fn partition(&self) -> PartitionKey {
        PartitionKey::new(self.task_type, self.priority)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingCounts {
    /// Sorted by partition.
    pub partitions: Vec<PartitionCounts>,
}

impl StagingCounts {
    pub fn ready_total(&self) -> usize {
        self.partitions.iter().map(|p| p.ready).sum()
    }

    pub fn future_total(&self) -> usize {
        self.partitions.iter().map(|p| p.future).sum()
    }

    pub fn get(&self, partition: PartitionKey) -> Option<&PartitionCounts> {
        self.partitions.iter().find(|p| p.partition() == partition)
    }
}
