use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::kind::FileKind;

/// A file surfaced by the scanner: identity, cheap stat data, and a
/// change-detection hash of the leading content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    /// Lowercase extension without the dot; empty if none.
    pub ext: String,
    pub kind: FileKind,
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    /// Creation time where the platform reports one, else mtime.
    pub ctime: i64,
    pub mime: Option<String>,
    /// SHA-256 (hex) of up to the first 1 MiB. A change signal, not an
    /// integrity check.
    pub content_hash: String,
}

/// Format-specific properties read without parsing full content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub kind: FileKind,
    pub mime: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub keywords: Option<String>,
    pub language: Option<String>,
    pub page_count: Option<u32>,
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Searchable text pulled out of a file, with an extraction quality score.
///
/// Extraction never raises past the per-file boundary: failures come back
/// as an empty text with `confidence = 0` and the reason in `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedContent {
    pub text: String,
    pub title: Option<String>,
    pub language: Option<String>,
    /// Extraction quality in [0, 1].
    pub confidence: f32,
    /// Set when the text was cut at the configured maximum length.
    pub truncated: bool,
    pub error: Option<String>,
}

impl ParsedContent {
    /// The failure form: empty text, zero confidence, reason recorded.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            confidence: 0.0,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some() && self.text.is_empty()
    }

    /// Character count of the extracted text.
    pub fn content_length(&self) -> usize {
        self.text.chars().count()
    }

    /// Whitespace-separated word count, used for the file row.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
