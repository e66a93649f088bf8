use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkStrategy;
use crate::error::CoreError;
use crate::kind::FileKind;

/// Top-level configuration. Every field has a working default so an empty
/// `{}` config file (or none at all) yields a runnable service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for all persistent state (db, indexes).
    pub data_root: PathBuf,
    pub scanner: ScannerConfig,
    pub parser: ParserConfig,
    pub chunk: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub fulltext: FulltextConfig,
    pub ai: AiConfig,
    pub job: JobConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            scanner: ScannerConfig::default(),
            parser: ParserConfig::default(),
            chunk: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector: VectorConfig::default(),
            fulltext: FulltextConfig::default(),
            ai: AiConfig::default(),
            job: JobConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// The chunking strategy implied by the chunk section.
    pub fn chunk_strategy(&self) -> ChunkStrategy {
        ChunkStrategy::new(self.chunk.default_size, self.chunk.overlap)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_root.join("db").join("app.db")
    }

    pub fn vector_index_path(&self) -> PathBuf {
        self.data_root
            .join("indexes")
            .join("vector")
            .join("file_index.bin")
    }

    pub fn fulltext_dir(&self) -> PathBuf {
        self.data_root.join("indexes").join("fulltext")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Worker pool size for per-file stat + hash.
    pub max_workers: usize,
    /// Files larger than this are dropped (bytes).
    pub max_file_size: u64,
    /// Extension allow-list (lowercase, no dot). Files outside it are
    /// silently skipped.
    pub supported_extensions: Vec<String>,
    pub include_hidden: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_file_size: 100 * 1024 * 1024,
            supported_extensions: default_extensions(),
            include_hidden: false,
        }
    }
}

fn default_extensions() -> Vec<String> {
    const DOCUMENTS: &[&str] = &[
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "md", "rtf", "odt", "ods",
        "odp",
    ];
    const CODE: &[&str] = &[
        "py", "js", "ts", "html", "css", "java", "cpp", "c", "go", "rs", "php", "rb", "swift",
        "kt",
    ];
    const AUDIO: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a"];
    const VIDEO: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm"];
    const IMAGES: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "svg"];

    [DOCUMENTS, CODE, AUDIO, VIDEO, IMAGES]
        .concat()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Parsed text is cut at this many characters, with a marker.
    pub max_content_length: usize,
    /// Drop runs of a character repeated at least `garbage_repeat_threshold`
    /// times and lines below `meaningful_ratio` printable content. Off by
    /// default: the heuristic can eat legitimate repeated strings.
    pub strip_garbage_runs: bool,
    pub garbage_repeat_threshold: usize,
    pub meaningful_ratio: f32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_content_length: 1024 * 1024,
            strip_garbage_runs: false,
            garbage_repeat_threshold: 4,
            meaningful_ratio: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target window size in characters (clamped 100–2000 at use).
    pub default_size: usize,
    /// Overlap carried between adjacent chunks (clamped to size/2).
    pub overlap: usize,
    /// Texts at or below this length stay a single chunk.
    pub threshold: usize,
    /// File kinds eligible for chunking.
    pub auto_kinds: Vec<FileKind>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            default_size: 500,
            overlap: 50,
            threshold: 600,
            auto_kinds: vec![FileKind::Document, FileKind::Text, FileKind::Pdf],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Texts per predictor call.
    pub batch_size: usize,
    /// Must match the vector index dimension.
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            dim: 384,
        }
    }
}

/// HNSW build/search knobs for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub connectivity: usize,
    pub expansion_add: usize,
    /// Search-time expansion, tunable without rebuilding.
    pub expansion_search: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            connectivity: 32,
            expansion_add: 200,
            expansion_search: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FulltextConfig {
    /// Tokenize CJK runs as bigrams in addition to Latin word runs.
    pub use_cjk_analyzer: bool,
}

impl Default for FulltextConfig {
    fn default() -> Self {
        Self {
            use_cjk_analyzer: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Base URL of the local model host.
    pub endpoint: String,
    pub embed_model: String,
    /// Deadline per embedding batch (seconds).
    pub embedding_timeout_secs: u64,
    pub speech: SpeechAiConfig,
    pub image: ImageAiConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            embedding_timeout_secs: 30,
            speech: SpeechAiConfig::default(),
            image: ImageAiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechAiConfig {
    /// Audio beyond this duration is truncated before transcription.
    pub max_duration_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SpeechAiConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 15 * 60,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageAiConfig {
    /// OCR lines below this confidence are discarded.
    pub ocr_min_confidence: f32,
    pub timeout_secs: u64,
}

impl Default for ImageAiConfig {
    fn default() -> Self {
        Self {
            ocr_min_confidence: 0.3,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Bounded parallelism of the per-file build stage.
    pub max_concurrent_files: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: 4,
        }
    }
}
