//! Task kinds served by `dwell run`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dwell_core::TaskId;
use dwell_core::typed::{Handler, HandlerError, TaskKind};

/// Publish an article at its scheduled time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticlePublish {
    pub article_id: i64,
}

impl TaskKind for ArticlePublish {
    const TASK_TYPE: i32 = 1001;
    const PRIORITY: i32 = 1;
}

pub struct ArticlePublishHandler;

#[async_trait]
impl Handler<ArticlePublish> for ArticlePublishHandler {
    async fn handle(&self, task_id: TaskId, params: ArticlePublish) -> Result<(), HandlerError> {
        if params.article_id <= 0 {
            return Err(HandlerError::failed(format!("invalid article id {}", params.article_id)));
        }
        tracing::info!(%task_id, article_id = params.article_id, "publishing article");
        Ok(())
    }
}
