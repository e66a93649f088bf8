/// Retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("storage error: {0}")]
    Storage(#[from] lode_storage::StorageError),

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("{capability} capability unavailable")]
    Unavailable { capability: &'static str },
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::Unavailable { .. } => true,
            Self::InvalidQuery { .. } => false,
        }
    }
}
