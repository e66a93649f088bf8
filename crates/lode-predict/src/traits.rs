use serde::{Deserialize, Serialize};

use crate::error::PredictError;

/// Speech-to-text output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Model-reported confidence in [0, 1].
    pub confidence: f32,
}

/// One recognized text line from an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f32,
}

/// Dense text embedding capability.
///
/// Implementations are process-wide singletons shared across worker
/// threads; batching and normalization live in [`crate::Embedder`], not
/// here.
pub trait EmbeddingPredictor: Send + Sync {
    /// Fixed output dimension.
    fn dimension(&self) -> usize;

    /// Embed each text. Must return exactly one vector per input, each of
    /// `dimension()` length.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PredictError>;
}

/// Speech-to-text capability. Input is WAV bytes (mono 16 kHz for video
/// tracks; the caller handles decoding and the duration cap).
pub trait SpeechPredictor: Send + Sync {
    fn transcribe(&self, audio: &[u8]) -> Result<Transcript, PredictError>;
}

/// Image text-reading capability (OCR).
pub trait VisionPredictor: Send + Sync {
    fn read_text(&self, image: &[u8]) -> Result<Vec<OcrLine>, PredictError>;
}
