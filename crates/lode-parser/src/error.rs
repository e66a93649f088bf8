use std::path::PathBuf;

/// Parser errors.
///
/// These stay inside the per-file pipeline boundary: the dispatcher turns
/// every one of them into a failed `ParsedContent`, never a panic or an
/// aborted job.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("binary content in {path}")]
    Binary { path: PathBuf },

    #[error("no extractor for {path}")]
    Unsupported { path: PathBuf },

    #[error("extractor failed for {path}: {reason}")]
    ExtractFailed { path: PathBuf, reason: String },

    #[error("predictor error: {0}")]
    Predict(#[from] lode_predict::PredictError),
}

impl ParserError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Predict(e) if e.is_retryable())
    }
}
