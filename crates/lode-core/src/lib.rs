mod chunk;
mod config;
mod error;
mod ids;
mod kind;
mod metadata;
mod status;

pub use chunk::{ChunkStrategy, TextChunk};
pub use config::{
    AiConfig, AppConfig, ChunkingConfig, EmbeddingConfig, FulltextConfig, ImageAiConfig,
    JobConfig, ParserConfig, ScannerConfig, SpeechAiConfig, VectorConfig,
};
pub use error::CoreError;
pub use ids::{ChunkId, FileId, JobId};
pub use kind::FileKind;
pub use metadata::{FileDescriptor, Metadata, ParsedContent};
pub use status::{IndexStatus, InputType, JobStatus, JobType, MatchType, SearchType};

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 boundary.
///
/// Returns a sub-slice that is always valid UTF-8 and at most `max_bytes` long.
pub fn truncate_utf8_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate a string to at most `max_chars` characters.
///
/// Chunk and preview positions are character-based, so truncation limits
/// must count characters, not bytes.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Byte offset of the `char_idx`-th character, clamped to the string length.
pub fn byte_offset_of_char(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}
