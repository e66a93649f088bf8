use std::path::Path;
use std::sync::Arc;

use lode_core::{FileKind, ParsedContent, ParserConfig};
use lode_predict::{SpeechPredictor, VisionPredictor};

use crate::detect::{is_binary, title_from_text};
use crate::media::{parse_av, parse_image, MediaDecoder};
use crate::office::{join_pages, DocumentExtractor};
use crate::text::{extract_html, extract_plain};

/// Marker appended when parsed text was cut at the configured maximum.
const TRUNCATION_MARKER: &str = "\n[content truncated]";

/// Extraction confidence by source, for formats whose reader does not
/// report its own score.
const CONF_PLAIN: f32 = 0.9;
const CONF_OFFICE: f32 = 0.9;
const CONF_PDF: f32 = 0.8;
const CONF_METADATA_ONLY: f32 = 0.5;

/// Everything the dispatcher needs besides the file itself. All the
/// capability slots are optional: a missing capability degrades that
/// format to a failed parse instead of refusing to construct.
pub struct ParserOptions {
    pub config: ParserConfig,
    pub extractors: Vec<Box<dyn DocumentExtractor>>,
    pub decoder: Option<Arc<dyn MediaDecoder>>,
    pub speech: Option<Arc<dyn SpeechPredictor>>,
    pub vision: Option<Arc<dyn VisionPredictor>>,
    pub speech_max_duration_secs: u64,
    pub ocr_min_confidence: f32,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            config: ParserConfig::default(),
            extractors: Vec::new(),
            decoder: None,
            speech: None,
            vision: None,
            speech_max_duration_secs: 15 * 60,
            ocr_min_confidence: 0.3,
        }
    }
}

/// Format-dispatched text extraction.
///
/// One blocking `parse` call per file; every failure mode comes back as a
/// `ParsedContent` with zero confidence and the reason recorded, so the
/// pipeline never has to unwind across a file boundary.
pub struct ContentParser {
    opts: ParserOptions,
}

impl ContentParser {
    pub fn new(opts: ParserOptions) -> Self {
        Self { opts }
    }

    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub fn parse(&self, path: &Path, kind: FileKind) -> ParsedContent {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let parsed = match kind {
            FileKind::Text => self.parse_text_like(path, &ext),
            FileKind::Document => {
                if matches!(ext.as_str(), "txt" | "md") {
                    self.parse_text_like(path, &ext)
                } else {
                    self.parse_paged(path, &ext, CONF_OFFICE)
                }
            }
            FileKind::Pdf => self.parse_paged(path, &ext, CONF_PDF),
            FileKind::Audio | FileKind::Video => self.parse_media(path),
            FileKind::Image => self.parse_picture(path),
            FileKind::Other => ParsedContent::failed("unsupported format"),
        };

        self.truncate(parsed)
    }

    fn parse_text_like(&self, path: &Path, ext: &str) -> ParsedContent {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => return ParsedContent::failed(format!("read failed: {e}")),
        };
        if is_binary(&bytes) {
            return ParsedContent::failed("binary content");
        }
        let (text, title) = if matches!(ext, "html" | "htm") {
            extract_html(&bytes)
        } else {
            let (text, title, _encoding) = extract_plain(&bytes);
            (text, title)
        };
        ParsedContent {
            text,
            title,
            confidence: CONF_PLAIN,
            ..Default::default()
        }
    }

    fn parse_paged(&self, path: &Path, ext: &str, confidence: f32) -> ParsedContent {
        let extractor = self.opts.extractors.iter().find(|e| e.handles(ext));
        let extractor = match extractor {
            Some(e) => e,
            None => {
                // No reader registered: fall back to whatever metadata
                // gives us, at reduced confidence.
                return ParsedContent {
                    title: crate::metadata::extract_metadata(path).title,
                    confidence: CONF_METADATA_ONLY,
                    ..Default::default()
                };
            }
        };
        match extractor.extract(path) {
            Ok(pages) => {
                let text = join_pages(&pages, &self.opts.config);
                let title = extractor.title(path).or_else(|| title_from_text(&text));
                ParsedContent {
                    text,
                    title,
                    confidence,
                    ..Default::default()
                }
            }
            Err(e) => ParsedContent::failed(format!("extract failed: {e}")),
        }
    }

    fn parse_media(&self, path: &Path) -> ParsedContent {
        let (decoder, speech) = match (&self.opts.decoder, &self.opts.speech) {
            (Some(d), Some(s)) => (d, s),
            _ => return ParsedContent::failed("speech capability unavailable"),
        };
        parse_av(path, decoder.as_ref(), speech, self.opts.speech_max_duration_secs)
    }

    fn parse_picture(&self, path: &Path) -> ParsedContent {
        let vision = match &self.opts.vision {
            Some(v) => v,
            None => return ParsedContent::failed("vision capability unavailable"),
        };
        parse_image(path, vision, self.opts.ocr_min_confidence)
    }

    fn truncate(&self, mut parsed: ParsedContent) -> ParsedContent {
        let max = self.opts.config.max_content_length;
        if parsed.content_length() > max {
            parsed.text = lode_core::truncate_chars(&parsed.text, max).to_string();
            parsed.text.push_str(TRUNCATION_MARKER);
            parsed.truncated = true;
        }
        parsed
    }
}
