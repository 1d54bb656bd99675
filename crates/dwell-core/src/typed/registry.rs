//! TypedRegistry - one handler per partition.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::TaskKind;
use crate::domain::PartitionKey;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler for partition {0} is already registered")]
    AlreadyRegistered(PartitionKey),
}

/// Handlers keyed by the partition their kind polls.
///
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<PublishArticle, _>(PublishHandler)?;
/// let handler = registry.get(PublishArticle::partition());
/// ```
#[derive(Default)]
pub struct TypedRegistry {
    handlers: BTreeMap<PartitionKey, Arc<dyn DynHandler>>,
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<K: TaskKind, H: Handler<K> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let partition = K::partition();
        if self.handlers.contains_key(&partition) {
            return Err(RegistryError::AlreadyRegistered(partition));
        }
        self.handlers
            .insert(partition, Arc::new(TypedHandler::<K, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, partition: PartitionKey) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(&partition).cloned()
    }

    /// Registered partitions in ascending order.
    pub fn partitions(&self) -> Vec<PartitionKey> {
        self.handlers.keys().copied().collect()
    }

    pub fn handlers(&self) -> impl Iterator<Item = Arc<dyn DynHandler>> + '_ {
        self.handlers.values().cloned()
    }
}
