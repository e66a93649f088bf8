use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Hard bounds on the chunk window size.
pub const MIN_CHUNK_SIZE: usize = 100;
pub const MAX_CHUNK_SIZE: usize = 2000;

/// A contiguous text window cut from a parsed document.
///
/// Positions are character offsets into the original parsed text,
/// end-exclusive. Adjacent chunks may overlap by up to the strategy's
/// overlap; together their `[start, end)` ranges cover the whole text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// 0-based position of this chunk within its file.
    pub index: u32,
    /// Character offset of the first character, inclusive.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    pub text: String,
}

impl TextChunk {
    /// Character length of the chunk text.
    pub fn content_length(&self) -> usize {
        self.text.chars().count()
    }
}

/// Windowing policy encoded as `"size+overlap"`, e.g. `"500+50"`.
///
/// Size is clamped to 100–2000 characters; overlap to at most half the
/// size. The string form is stored on the file row so a later rebuild can
/// reproduce the original slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStrategy {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkStrategy {
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        let overlap = overlap.min(size / 2);
        Self { size, overlap }
    }

    /// Parse a `"S+O"` string. A missing overlap defaults to 10% of the
    /// size (capped at 50), matching the stored-strategy format.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let mut parts = s.splitn(2, '+');
        let size_part = parts.next().unwrap_or("").trim();
        let size: usize = size_part
            .parse()
            .map_err(|_| CoreError::InvalidStrategy { raw: s.to_string() })?;
        let overlap = match parts.next() {
            Some(o) => o
                .trim()
                .parse()
                .map_err(|_| CoreError::InvalidStrategy { raw: s.to_string() })?,
            None => (size / 10).min(50),
        };
        Ok(Self::new(size, overlap))
    }
}

impl Default for ChunkStrategy {
    fn default() -> Self {
        Self {
            size: 500,
            overlap: 50,
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.size, self.overlap)
    }
}
