use std::path::PathBuf;

/// Indexer errors.
///
/// Per-file problems never surface here; they are folded into the job's
/// error counters. These are job-level failures: an unreadable root, a
/// broken storage backend, an impossible job transition.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("storage error: {0}")]
    Storage(#[from] lode_storage::StorageError),

    #[error("root path unreadable: {path}: {reason}")]
    RootUnreadable { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}
