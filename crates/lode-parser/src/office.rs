use std::path::Path;

use lode_core::ParserConfig;

use crate::error::ParserError;

/// One page / sheet / slide of text from a paged document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub text: String,
}

/// Seam for external PDF/Office readers.
///
/// The actual format libraries live outside this crate; whatever reads the
/// file implements this trait and hands back per-page text plus whatever
/// document properties it found.
pub trait DocumentExtractor: Send + Sync {
    /// Which lowercase extensions this extractor handles.
    fn handles(&self, ext: &str) -> bool;

    /// Extract per-page text. An empty Vec is a legal result (e.g. a
    /// scanned PDF with no text layer).
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedPage>, ParserError>;

    /// Optional document title from format metadata.
    fn title(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Marker inserted between pages when joining extracted text.
pub const PAGE_MARKER: &str = "\n\n";

/// Join pages with the page marker, optionally applying the garbage-run
/// cleanup heuristics.
pub fn join_pages(pages: &[ExtractedPage], config: &ParserConfig) -> String {
    let joined = pages
        .iter()
        .map(|p| p.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_MARKER);
    if config.strip_garbage_runs {
        clean_garbage(&joined, config.garbage_repeat_threshold, config.meaningful_ratio)
    } else {
        joined
    }
}

/// Remove runs of a single character repeated at least `repeat_threshold`
/// times, then drop lines whose share of meaningful characters falls
/// below `min_ratio`. Extraction artifacts from broken text layers look
/// exactly like this; real prose rarely does — but it can, which is why
/// the whole pass is opt-in.
pub fn clean_garbage(text: &str, repeat_threshold: usize, min_ratio: f32) -> String {
    let repeat_threshold = repeat_threshold.max(2);
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        let collapsed = collapse_repeats(line, repeat_threshold);
        if meaningful_ratio(&collapsed) >= min_ratio || collapsed.trim().is_empty() {
            out.push_str(&collapsed);
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn collapse_repeats(line: &str, threshold: usize) -> String {
    let mut out = String::with_capacity(line.len());
    let mut run_char: Option<char> = None;
    let mut run_len = 0usize;
    let mut run_buf = String::new();

    for ch in line.chars() {
        if Some(ch) == run_char {
            run_len += 1;
            if run_len < threshold {
                run_buf.push(ch);
            }
        } else {
            if run_len < threshold {
                out.push_str(&run_buf);
            }
            run_char = Some(ch);
            run_len = 1;
            run_buf.clear();
            run_buf.push(ch);
        }
    }
    if run_len < threshold {
        out.push_str(&run_buf);
    }
    out
}

/// Share of alphanumeric / CJK / common-punctuation characters in a line.
fn meaningful_ratio(line: &str) -> f32 {
    let total = line.chars().count();
    if total == 0 {
        return 1.0;
    }
    let meaningful = line
        .chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '-' | '(' | ')' | '\'' | '"')
        })
        .count();
    meaningful as f32 / total as f32
}
