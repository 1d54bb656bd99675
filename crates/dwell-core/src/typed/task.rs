//! TaskKind trait - binds a parameter type to its partition.
//!
//! Producers and consumers share one definition per kind, so a type code
//! or priority can never drift between the two sides.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::PartitionKey;

/// A typed kind of delayed task.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct PublishArticle {
///     article_id: u64,
/// }
///
/// impl TaskKind for PublishArticle {
///     const TASK_TYPE: i32 = 1001;
///     const PRIORITY: i32 = 1;
/// }
/// ```
pub trait TaskKind: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TASK_TYPE: i32;
    const PRIORITY: i32;

    fn partition() -> PartitionKey {
        PartitionKey::new(Self::TASK_TYPE, Self::PRIORITY)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::TaskKind;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PublishArticle {
        pub article_id: u64,
    }

    impl TaskKind for PublishArticle {
        const TASK_TYPE: i32 = 1001;
        const PRIORITY: i32 = 1;
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SendDigest {
        pub user: String,
    }

    impl TaskKind for SendDigest {
        const TASK_TYPE: i32 = 1002;
        const PRIORITY: i32 = 3;
    }
}
