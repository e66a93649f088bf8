use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lode_core::AppConfig;
use lode_engine::{Predictors, Services};
use lode_predict::{
    EmbeddingPredictor, HashEmbedding, OcrLine, PredictError, SpeechPredictor, Transcript,
    VisionPredictor,
};

/// Embedding dimension used across the end-to-end tests.
pub const TEST_DIM: usize = 128;

/// Install a fmt subscriber once for test/bench logs (RUST_LOG-driven).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// Config rooted in a scratch dir with the deterministic embedding dim.
pub fn test_config(data_root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.data_root = data_root.to_path_buf();
    config.embedding.dim = TEST_DIM;
    config
}

/// Services over the offline (hash) embedding, no speech/vision.
pub fn offline_services(data_root: &Path) -> Services {
    init_tracing();
    Services::start(test_config(data_root), Predictors::offline(TEST_DIM))
        .expect("services start")
}

/// Services with a canned speech predictor for the multimodal scenario.
pub fn services_with_speech(data_root: &Path, transcript: &str, confidence: f32) -> Services {
    init_tracing();
    let mut predictors = Predictors::offline(TEST_DIM);
    predictors.speech = Some(Arc::new(CannedSpeech {
        transcript: transcript.to_string(),
        confidence,
    }));
    Services::start(test_config(data_root), predictors).expect("services start")
}

/// Services whose embedding predictor sleeps per call, for cancellation
/// timing tests.
pub fn slow_services(data_root: &Path, delay: Duration) -> Services {
    init_tracing();
    let mut predictors = Predictors::offline(TEST_DIM);
    predictors.embedding = Arc::new(SlowEmbedding {
        inner: HashEmbedding::new(TEST_DIM),
        delay,
    });
    Services::start(test_config(data_root), predictors).expect("services start")
}

/// Speech predictor returning a fixed transcript.
pub struct CannedSpeech {
    pub transcript: String,
    pub confidence: f32,
}

impl SpeechPredictor for CannedSpeech {
    fn transcribe(&self, _audio: &[u8]) -> Result<Transcript, PredictError> {
        Ok(Transcript {
            text: self.transcript.clone(),
            confidence: self.confidence,
        })
    }
}

/// Vision predictor returning fixed OCR lines.
pub struct CannedVision(pub Vec<OcrLine>);

impl VisionPredictor for CannedVision {
    fn read_text(&self, _image: &[u8]) -> Result<Vec<OcrLine>, PredictError> {
        Ok(self.0.clone())
    }
}

struct SlowEmbedding {
    inner: HashEmbedding,
    delay: Duration,
}

impl EmbeddingPredictor for SlowEmbedding {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PredictError> {
        std::thread::sleep(self.delay);
        self.inner.embed(texts)
    }
}

/// A markdown document of exactly `total_chars` characters: paragraphs of
/// 60-character sentences separated by blank lines, so the chunker always
/// finds sentence and paragraph boundaries.
pub fn sentence_document(total_chars: usize) -> String {
    let mut out = String::with_capacity(total_chars + 64);
    let mut sentence_no = 0usize;
    while out.chars().count() < total_chars {
        // ten 60-char sentences per paragraph
        for _ in 0..10 {
            let mut sentence = format!("sentence number {sentence_no} speaks of indexing ");
            while sentence.len() < 58 {
                sentence.push('w');
            }
            sentence.truncate(58);
            out.push_str(&sentence);
            out.push_str(". ");
            sentence_no += 1;
        }
        out.pop();
        out.push('\n');
        out.push('\n');
    }
    out.chars().take(total_chars).collect()
}

/// Write `count` small distinct text files under `dir`.
pub fn write_small_corpus(dir: &Path, count: usize) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).expect("corpus dir");
    (0..count)
        .map(|i| {
            let path = dir.join(format!("file{i:04}.txt"));
            std::fs::write(
                &path,
                format!("document number {i} talks about topic {}.", i % 7),
            )
            .expect("corpus file");
            path
        })
        .collect()
}
