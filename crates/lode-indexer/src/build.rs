use lode_core::{
    AppConfig, ChunkStrategy, FileDescriptor, Metadata, ParsedContent, TextChunk,
};
use lode_parser::{chunker, extract_metadata, ContentParser};
use lode_predict::Embedder;

/// Confidence multiplier applied when the embedding predictor fell back to
/// zero vectors for part of a file.
const DEGRADED_CONFIDENCE_FACTOR: f32 = 0.8;

/// Everything produced for one file before the storage write: metadata,
/// parsed text, chunks, and their embeddings, all in chunk order.
#[derive(Debug)]
pub struct FileBuild {
    pub descriptor: FileDescriptor,
    pub metadata: Metadata,
    pub parsed: ParsedContent,
    pub chunks: Vec<TextChunk>,
    pub vectors: Vec<Vec<f32>>,
    pub is_chunked: bool,
    pub strategy: ChunkStrategy,
    /// Effective confidence after any embedding degradation.
    pub confidence: f32,
}

impl FileBuild {
    pub fn avg_chunk_size(&self) -> Option<f64> {
        if self.chunks.is_empty() {
            return None;
        }
        let total: usize = self.chunks.iter().map(|c| c.content_length()).sum();
        Some(total as f64 / self.chunks.len() as f64)
    }
}

/// Outcome of building one file.
#[derive(Debug)]
pub enum BuildOutcome {
    Built(Box<FileBuild>),
    Failed {
        descriptor: FileDescriptor,
        reason: String,
    },
}

/// The per-file stage: metadata → parse → chunk decision → chunk → embed.
///
/// Runs on a worker thread; everything that can go wrong per file comes
/// back as `BuildOutcome::Failed` and is charged to the job's error
/// counters by the writer.
pub fn build_file(
    descriptor: FileDescriptor,
    parser: &ContentParser,
    embedder: &Embedder,
    config: &AppConfig,
) -> BuildOutcome {
    let metadata = extract_metadata(&descriptor.path);
    let parsed = parser.parse(&descriptor.path, descriptor.kind);
    if parsed.is_failure() {
        let reason = parsed
            .error
            .unwrap_or_else(|| "parse failed".to_string());
        return BuildOutcome::Failed { descriptor, reason };
    }

    let strategy = config.chunk_strategy();
    let chunkable = config.chunk.auto_kinds.contains(&descriptor.kind)
        && parsed.content_length() > config.chunk.threshold
        && chunker::has_paragraph_markers(&parsed.text);

    let chunks = if parsed.text.is_empty() {
        Vec::new()
    } else if chunkable {
        chunker::chunk_text(&parsed.text, strategy, config.chunk.threshold)
    } else {
        vec![TextChunk {
            index: 0,
            start: 0,
            end: parsed.content_length(),
            text: parsed.text.clone(),
        }]
    };

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embedded = embedder.embed(&texts, true);
    let confidence = if embedded.degraded {
        parsed.confidence * DEGRADED_CONFIDENCE_FACTOR
    } else {
        parsed.confidence
    };

    BuildOutcome::Built(Box::new(FileBuild {
        is_chunked: chunkable && chunks.len() > 1,
        vectors: embedded.vectors,
        confidence,
        descriptor,
        metadata,
        parsed,
        chunks,
        strategy,
    }))
}
