/// Errors from predictor calls.
///
/// Predictors are external collaborators; every failure here is expected to
/// be survivable by the caller (zero-vector fallback in the pipeline,
/// service-unavailable at the search boundary).
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("predictor unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("predictor returned status {code}: {reason}")]
    Status { code: u16, reason: String },

    #[error("malformed predictor response: {reason}")]
    Malformed { reason: String },
}

impl PredictError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Status { code, .. } => *code >= 500,
            Self::Malformed { .. } => false,
        }
    }
}
