//! ParameterCodec - typed parameters <-> opaque task bytes (JSON).

use super::task::TaskKind;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode parameters of task type {task_type}: {source}")]
    Encode {
        task_type: i32,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode parameters of task type {task_type}: {source}")]
    Decode {
        task_type: i32,
        #[source]
        source: serde_json::Error,
    },
}

pub struct ParameterCodec;

impl ParameterCodec {
    pub fn encode<K: TaskKind>(params: &K) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(params).map_err(|source| CodecError::Encode {
            task_type: K::TASK_TYPE,
            source,
        })
    }

    pub fn decode<K: TaskKind>(bytes: &[u8]) -> Result<K, CodecError> {
        serde_json::from_slice(bytes).map_err(|source| CodecError::Decode {
            task_type: K::TASK_TYPE,
            source,
        })
    }
}
