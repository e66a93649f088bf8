use lode_retrieval::RetrievalError;

/// The error surface of the consumer API.
///
/// Everything except `Fatal` is recoverable by the caller; `Fatal` means
/// the data root or its schema is unusable and an operator has to look.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {reason}")]
    Validation { reason: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{capability} capability unavailable")]
    Unavailable { capability: &'static str },

    #[error("storage error: {0}")]
    Storage(#[from] lode_storage::StorageError),

    #[error("indexer error: {0}")]
    Indexer(#[from] lode_indexer::IndexerError),

    #[error("fatal: {reason}")]
    Fatal { reason: String },
}

impl From<RetrievalError> for EngineError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::InvalidQuery { reason } => Self::Validation { reason },
            RetrievalError::Unavailable { capability } => Self::Unavailable { capability },
            RetrievalError::Storage(e) => Self::Storage(e),
        }
    }
}
