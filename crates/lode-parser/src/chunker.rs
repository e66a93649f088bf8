use lode_core::{ChunkStrategy, TextChunk};

/// Window-cut markers searched in the tail of each window, best first.
/// Paragraph breaks beat line breaks beat sentence ends; CJK sentence
/// punctuation is single-character, Latin forms need the trailing space.
const BOUNDARY_MARKERS: &[&str] = &[
    "\n\n\n", "\n\n", "\n", "。", "！", "？", "；", ". ", "! ", "? ", "; ",
];

/// Markers that can start a trimmed overlap prefix.
const SENTENCE_MARKERS: &[&str] = &["\n", "。", "！", "？", "；", ". ", "! ", "? ", "; "];

/// Fraction of the window searched backwards for a boundary.
const BOUNDARY_SEARCH_TAIL: f32 = 0.2;

/// Whether the text has enough paragraph/sentence structure to be worth
/// chunking. A single unbroken token stream gets wrapped whole instead.
pub fn has_paragraph_markers(text: &str) -> bool {
    if text.contains("\n\n") {
        return true;
    }
    ["。", "！", "？", "；", ". ", "! ", "? ", "; "]
        .iter()
        .any(|m| text.contains(m))
}

/// Slice text into overlapping windows under the `"S+O"` policy.
///
/// All positions are character offsets into `text`, end-exclusive. The
/// produced chunks are ordered, indexed from 0, and their ranges cover
/// every character of the input (overlaps allowed). Texts at or below
/// `threshold` come back as one chunk.
pub fn chunk_text(text: &str, strategy: ChunkStrategy, threshold: usize) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }
    if len <= threshold {
        return vec![TextChunk {
            index: 0,
            start: 0,
            end: len,
            text: text.to_string(),
        }];
    }

    let size = strategy.size;
    let overlap = strategy.overlap;
    let mut chunks = Vec::new();
    let mut pos = 0usize;
    let mut index = 0u32;

    while pos < len {
        let window_end = (pos + size).min(len);
        let cut = if window_end < len {
            find_cut(&chars, pos, window_end)
        } else {
            window_end
        };

        let start = if index == 0 || overlap == 0 {
            pos
        } else {
            trim_overlap(&chars, pos.saturating_sub(overlap), pos)
        };

        chunks.push(TextChunk {
            index,
            start,
            end: cut,
            text: chars[start..cut].iter().collect(),
        });
        index += 1;
        pos = cut;
    }

    chunks
}

/// Pick the cut position for a window `[pos, window_end)`: the end of the
/// first occurrence of the best boundary marker found in the window's
/// tail, else the hard window edge.
fn find_cut(chars: &[char], pos: usize, window_end: usize) -> usize {
    let window = window_end - pos;
    let tail = ((window as f32) * (1.0 - BOUNDARY_SEARCH_TAIL)) as usize;
    let search_start = (pos + tail).clamp(pos + 1, window_end - 1);

    for marker in BOUNDARY_MARKERS {
        let needle: Vec<char> = marker.chars().collect();
        if let Some(found) = find_chars(chars, &needle, search_start, window_end) {
            let cut = found + needle.len();
            if cut > pos {
                return cut;
            }
        }
    }
    window_end
}

/// First occurrence of `needle` fully inside `[start, end)`, by index.
fn find_chars(chars: &[char], needle: &[char], start: usize, end: usize) -> Option<usize> {
    let last = end.checked_sub(needle.len())?;
    (start..=last).find(|&i| chars[i..i + needle.len()] == *needle)
}

/// Snap the overlap start forward to just past the first sentence boundary
/// inside the overlap region, so the carried prefix begins on a sentence.
fn trim_overlap(chars: &[char], ov_start: usize, pos: usize) -> usize {
    for marker in SENTENCE_MARKERS {
        let needle: Vec<char> = marker.chars().collect();
        if let Some(found) = find_chars(chars, &needle, ov_start, pos) {
            let s = found + needle.len();
            if s < pos {
                return s;
            }
        }
    }
    ov_start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(size: usize, overlap: usize) -> ChunkStrategy {
        ChunkStrategy::new(size, overlap)
    }

    /// Build a text of `paragraphs` paragraphs, each from sentences of
    /// `sentence_len` characters ending in ". ".
    fn sentence_paragraphs(paragraphs: usize, sentences_per: usize, sentence_len: usize) -> String {
        let mut out = String::new();
        for p in 0..paragraphs {
            for s in 0..sentences_per {
                let body_len = sentence_len - 2;
                let mut sentence = format!("p{p}s{s} ");
                while sentence.len() < body_len {
                    sentence.push('w');
                }
                sentence.truncate(body_len);
                out.push_str(&sentence);
                out.push_str(". ");
            }
            out.pop();
            out.pop();
            out.push('.');
            if p + 1 < paragraphs {
                out.push_str("\n\n");
            }
        }
        out
    }

    #[test]
    fn short_text_single_chunk() {
        let text = "machine learning is a branch of artificial intelligence.";
        let chunks = chunk_text(text, strategy(500, 50), 600);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, text.chars().count());
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(chunk_text("", strategy(500, 50), 600).is_empty());
    }

    #[test]
    fn exactly_threshold_is_single_chunk() {
        let text = "x".repeat(600);
        let chunks = chunk_text(&text, strategy(500, 50), 600);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn long_text_chunked_with_ordering_and_coverage() {
        let text = sentence_paragraphs(4, 10, 60);
        let chunks = chunk_text(&text, strategy(500, 50), 600);
        let len = text.chars().count();

        assert!(chunks.len() >= 2);
        // indexes are 0..N-1 in order
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index as usize, i);
            assert!(c.start < c.end, "start {} < end {}", c.start, c.end);
        }
        // starts strictly increase
        for w in chunks.windows(2) {
            assert!(w[0].start < w[1].start);
        }
        // coverage: consecutive ranges touch or overlap, ending at len
        assert_eq!(chunks[0].start, 0);
        for w in chunks.windows(2) {
            assert!(w[1].start <= w[0].end, "gap between chunks");
        }
        assert_eq!(chunks.last().unwrap().end, len);
    }

    #[test]
    fn chunk_text_matches_positions() {
        let text = sentence_paragraphs(3, 8, 70);
        let chars: Vec<char> = text.chars().collect();
        for c in chunk_text(&text, strategy(400, 40), 600) {
            let expected: String = chars[c.start..c.end].iter().collect();
            assert_eq!(c.text, expected);
        }
    }

    #[test]
    fn cuts_prefer_sentence_boundaries() {
        let text = sentence_paragraphs(4, 10, 60);
        let chunks = chunk_text(&text, strategy(500, 50), 600);
        // every non-final cut should land right after a boundary marker
        let chars: Vec<char> = text.chars().collect();
        for c in &chunks[..chunks.len() - 1] {
            let before = chars[c.end - 1];
            assert!(
                before == ' ' || before == '\n' || before == '.',
                "cut at {} lands after '{}'",
                c.end,
                before
            );
        }
    }

    #[test]
    fn chunk_size_envelope() {
        let text = sentence_paragraphs(4, 10, 60);
        let s = strategy(500, 50);
        let chunks = chunk_text(&text, s, 600);
        for c in &chunks {
            assert!(
                c.content_length() <= s.size + s.overlap,
                "chunk {} too large: {}",
                c.index,
                c.content_length()
            );
        }
        for c in &chunks[..chunks.len() - 1] {
            assert!(
                c.content_length() >= s.size / 3,
                "chunk {} suspiciously small: {}",
                c.index,
                c.content_length()
            );
        }
    }

    #[test]
    fn overlap_extends_chunks_backwards() {
        let text = sentence_paragraphs(4, 10, 60);
        let with = chunk_text(&text, strategy(500, 50), 600);
        let without = chunk_text(&text, strategy(500, 0), 600);
        // same cut positions, overlap only moves starts back
        for c in &with[1..] {
            assert!(c.start <= c.end);
        }
        for (w, wo) in with.iter().zip(without.iter()) {
            assert!(w.start <= wo.start + 50);
        }
        // at least one later chunk actually overlaps its predecessor
        assert!(
            with.windows(2).any(|p| p[1].start < p[0].end),
            "expected overlapping ranges"
        );
    }

    #[test]
    fn no_boundary_falls_back_to_hard_cut() {
        let mut text = "y".repeat(1150);
        // force chunkability decision to be made by the caller; chunk_text
        // itself always cuts
        text.push('.');
        let chunks = chunk_text(&text, strategy(500, 0), 600);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].end, 500);
        assert_eq!(chunks[1].end, 1000);
        assert_eq!(chunks[2].end, 1151);
    }

    #[test]
    fn cjk_sentence_boundaries_respected() {
        let sentence = format!("{}。", "机".repeat(59));
        let text = sentence.repeat(20); // 1200 chars
        let chunks = chunk_text(&text, strategy(500, 50), 600);
        assert!(chunks.len() >= 2);
        let chars: Vec<char> = text.chars().collect();
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(chars[c.end - 1], '。', "cut should land after 。");
        }
    }

    #[test]
    fn de_overlapped_concatenation_reproduces_text() {
        let text = sentence_paragraphs(4, 10, 60);
        let chunks = chunk_text(&text, strategy(500, 50), 600);
        let chars: Vec<char> = text.chars().collect();
        let mut rebuilt = String::new();
        let mut covered = 0usize;
        for c in &chunks {
            let from = covered.max(c.start);
            rebuilt.push_str(&chars[from..c.end].iter().collect::<String>());
            covered = c.end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn paragraph_marker_detection() {
        assert!(has_paragraph_markers("one\n\ntwo"));
        assert!(has_paragraph_markers("A sentence. Another."));
        assert!(has_paragraph_markers("中文句子。第二句。"));
        assert!(!has_paragraph_markers("pythontutorial".repeat(100).as_str()));
        assert!(!has_paragraph_markers("one\ntwo\nthree"));
    }
}
