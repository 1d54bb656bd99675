//! Handler trait - consumer side of a task kind.
//!
//! - `Handler<K>`: typed, what applications implement
//! - `DynHandler`: object-safe, what the registry and consumer loop hold
//! - `TypedHandler<K, H>`: the type-erasing adapter between the two

use std::marker::PhantomData;

use async_trait::async_trait;

use super::codec::{CodecError, ParameterCodec};
use super::task::TaskKind;
use crate::domain::{PartitionKey, Task, TaskId};

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Runs a delivered task of kind `K`.
///
/// The task is already `EXECUTED` in the store when this is called, so an
/// error is reported but the task is not redelivered.
#[async_trait]
pub trait Handler<K: TaskKind>: Send + Sync {
    async fn handle(&self, task_id: TaskId, params: K) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, task: &Task) -> Result<(), HandlerError>;

    fn partition(&self) -> PartitionKey;
}

pub struct TypedHandler<K: TaskKind, H: Handler<K>> {
    handler: H,
    _marker: PhantomData<K>,
}

impl<K: TaskKind, H: Handler<K>> TypedHandler<K, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<K: TaskKind, H: Handler<K>> DynHandler for TypedHandler<K, H> {
    async fn handle_dyn(&self, task: &Task) -> Result<(), HandlerError> {
        let params = ParameterCodec::decode::<K>(&task.parameters)?;
        self.handler.handle(task.task_id, params).await
    }

    fn partition(&self) -> PartitionKey {
        K::partition()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{FailingHandler, RecordingHandler};
    use super::*;
    use crate::domain::NewTask;
    use crate::typed::task::fixtures::{PublishArticle, SendDigest};
    use chrono::Utc;
    use ulid::Ulid;

    fn task_with(params: Vec<u8>, task_type: i32, priority: i32) -> Task {
        NewTask::new(task_type, priority, Utc::now())
            .with_parameters(params)
            .into_task(TaskId::from(Ulid::new()))
    }

    #[tokio::test]
    async fn typed_handler_decodes_parameters() {
        let recording = RecordingHandler::default();
        let handler = TypedHandler::<PublishArticle, _>::new(recording.clone());

        let task = task_with(br#"{"article_id":42}"#.to_vec(), 1001, 1);
        handler.handle_dyn(&task).await.unwrap();

        assert_eq!(*recording.seen.lock().await, vec![42]);
        assert_eq!(handler.partition(), PartitionKey::new(1001, 1));
    }

    #[tokio::test]
    async fn undecodable_parameters_never_reach_the_handler() {
        let recording = RecordingHandler::default();
        let handler = TypedHandler::<PublishArticle, _>::new(recording.clone());

        let err = handler
            .handle_dyn(&task_with(b"not json".to_vec(), 1001, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Codec(_)));
        assert!(recording.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn handler_failure_is_reported() {
        let handler = TypedHandler::<SendDigest, _>::new(FailingHandler);
        let err = handler
            .handle_dyn(&task_with(br#"{"user":"ana"}"#.to_vec(), 1002, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Failed(_)));
    }
}
