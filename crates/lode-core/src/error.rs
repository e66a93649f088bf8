/// Errors from lode-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid value '{value}' for {type_name}")]
    InvalidVariant {
        type_name: &'static str,
        value: String,
    },

    #[error("invalid chunk strategy '{raw}'")]
    InvalidStrategy { raw: String },

    #[error("config load failed: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
