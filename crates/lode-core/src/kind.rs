use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Coarse file classification used for parser dispatch, chunk eligibility,
/// and search filtering.
///
/// `Document` covers office formats and prose files (txt, md, …); `Text`
/// covers source code and markup that is read verbatim. PDF gets its own
/// variant because its extraction confidence differs from other documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Document,
    Text,
    Pdf,
    Image,
    Audio,
    Video,
    #[default]
    Other,
}

const DOCUMENT_EXTS: &[&str] = &[
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "rtf", "odt", "ods", "odp", "txt", "md",
];

const TEXT_EXTS: &[&str] = &[
    "py", "js", "ts", "html", "htm", "css", "java", "cpp", "c", "h", "go", "rs", "php", "rb",
    "swift", "kt", "json", "xml", "yaml", "yml", "toml",
];

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "svg"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a"];
const VIDEO_EXTS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm"];

impl FileKind {
    /// Classify by lowercase extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        let ext = ext.trim_start_matches('.');
        if ext == "pdf" {
            Self::Pdf
        } else if DOCUMENT_EXTS.contains(&ext) {
            Self::Document
        } else if TEXT_EXTS.contains(&ext) {
            Self::Text
        } else if IMAGE_EXTS.contains(&ext) {
            Self::Image
        } else if AUDIO_EXTS.contains(&ext) {
            Self::Audio
        } else if VIDEO_EXTS.contains(&ext) {
            Self::Video
        } else {
            Self::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Text => "text",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "document" => Ok(Self::Document),
            "text" => Ok(Self::Text),
            "pdf" => Ok(Self::Pdf),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "other" => Ok(Self::Other),
            _ => Err(CoreError::InvalidVariant {
                type_name: "FileKind",
                value: s.to_string(),
            }),
        }
    }

    /// Resolve a search filter value that may be either a kind name or a
    /// bare extension (callers sometimes pass `"docx"` where `"document"`
    /// is meant).
    pub fn from_filter_value(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|_| Self::from_extension(s))
    }

    /// Whether text extracted from this kind of file carries enough
    /// structure to be worth chunking.
    pub fn is_chunkable(self) -> bool {
        matches!(self, Self::Document | Self::Text | Self::Pdf)
    }
}
