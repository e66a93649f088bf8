use std::time::Duration;

use serde::Deserialize;

use crate::error::PredictError;
use crate::traits::{EmbeddingPredictor, OcrLine, SpeechPredictor, Transcript, VisionPredictor};

fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

fn map_ureq(e: ureq::Error) -> PredictError {
    match e {
        ureq::Error::Status(code, resp) => PredictError::Status {
            code,
            reason: resp.status_text().to_string(),
        },
        ureq::Error::Transport(t) => PredictError::Unavailable {
            reason: t.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Blocking client for an Ollama-style `/api/embed` endpoint.
///
/// Fully synchronous on purpose: the indexing pipeline runs on plain worker
/// threads, so a blocking client with a per-call deadline is all the
/// cancellation story the predictor needs.
pub struct HttpEmbedding {
    agent: ureq::Agent,
    url: String,
    model: String,
    dim: usize,
}

impl HttpEmbedding {
    pub fn new(endpoint: &str, model: &str, dim: usize, timeout_secs: u64) -> Self {
        Self {
            agent: agent(timeout_secs),
            url: format!("{}/api/embed", endpoint.trim_end_matches('/')),
            model: model.to_string(),
            dim,
        }
    }
}

impl EmbeddingPredictor for HttpEmbedding {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PredictError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let resp = self
            .agent
            .post(&self.url)
            .send_json(body)
            .map_err(map_ureq)?;
        let parsed: EmbedResponse = resp.into_json().map_err(|e| PredictError::Malformed {
            reason: e.to_string(),
        })?;
        Ok(parsed.embeddings)
    }
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SpeechResponse {
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Blocking client for a speech-to-text endpoint taking raw WAV bytes.
pub struct HttpSpeech {
    agent: ureq::Agent,
    url: String,
}

impl HttpSpeech {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        Self {
            agent: agent(timeout_secs),
            url: format!("{}/api/transcribe", endpoint.trim_end_matches('/')),
        }
    }
}

impl SpeechPredictor for HttpSpeech {
    fn transcribe(&self, audio: &[u8]) -> Result<Transcript, PredictError> {
        let resp = self
            .agent
            .post(&self.url)
            .set("content-type", "audio/wav")
            .send_bytes(audio)
            .map_err(map_ureq)?;
        let parsed: SpeechResponse = resp.into_json().map_err(|e| PredictError::Malformed {
            reason: e.to_string(),
        })?;
        Ok(Transcript {
            text: parsed.text,
            confidence: parsed.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
        })
    }
}

// ---------------------------------------------------------------------------
// Vision (OCR)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OcrResponse {
    lines: Vec<OcrResponseLine>,
}

#[derive(Deserialize)]
struct OcrResponseLine {
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Blocking client for an image text-reading endpoint.
pub struct HttpVision {
    agent: ureq::Agent,
    url: String,
}

impl HttpVision {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        Self {
            agent: agent(timeout_secs),
            url: format!("{}/api/ocr", endpoint.trim_end_matches('/')),
        }
    }
}

impl VisionPredictor for HttpVision {
    fn read_text(&self, image: &[u8]) -> Result<Vec<OcrLine>, PredictError> {
        let resp = self
            .agent
            .post(&self.url)
            .set("content-type", "application/octet-stream")
            .send_bytes(image)
            .map_err(map_ureq)?;
        let parsed: OcrResponse = resp.into_json().map_err(|e| PredictError::Malformed {
            reason: e.to_string(),
        })?;
        Ok(parsed
            .lines
            .into_iter()
            .map(|l| OcrLine {
                text: l.text,
                confidence: l.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            })
            .collect())
    }
}
