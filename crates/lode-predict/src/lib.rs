mod embedder;
mod error;
mod hashing;
mod http;
mod traits;

pub use embedder::{EmbeddingBatch, Embedder};
pub use error::PredictError;
pub use hashing::HashEmbedding;
pub use http::{HttpEmbedding, HttpSpeech, HttpVision};
pub use traits::{EmbeddingPredictor, OcrLine, SpeechPredictor, Transcript, VisionPredictor};
