use crate::detect::{decode_text, title_from_text};

/// Extract plain text from text-like bytes (txt, md, code).
///
/// Returns (text, title, encoding name).
pub fn extract_plain(content: &[u8]) -> (String, Option<String>, &'static str) {
    let (text, encoding) = decode_text(content);
    let title = title_from_text(&text);
    (text, title, encoding)
}

/// Extract readable text from HTML bytes: script/style bodies dropped,
/// tags stripped, entities for the common five decoded, whitespace
/// collapsed per line.
pub fn extract_html(content: &[u8]) -> (String, Option<String>) {
    let (html, _) = decode_text(content);
    let title = html_title(&html);
    let text = strip_tags(&html);
    let title = title.or_else(|| title_from_text(&text));
    (text, title)
}

fn html_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let open = lower.find("<title")?;
    let open_end = lower[open..].find('>')? + open + 1;
    let close = lower[open_end..].find("</title>")? + open_end;
    let raw = decode_entities(html[open_end..close].trim());
    if raw.is_empty() {
        None
    } else {
        Some(lode_core::truncate_chars(&raw, 200).to_string())
    }
}

/// Byte-state-machine tag stripper. Handles `<script>`/`<style>` skipping
/// and HTML comments; block-level closers emit newlines so paragraph
/// structure survives for the chunker.
fn strip_tags(html: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Text,
        Tag,
        Comment,
        Skip(&'static str),
    }

    let mut out = String::with_capacity(html.len() / 2);
    let mut state = State::Text;
    let mut tag = String::new();
    let bytes = html.as_bytes();
    let mut i = 0;

    while i < html.len() {
        // Advance over one full char; multi-byte chars only matter in Text.
        let ch_len = utf8_len(bytes[i]);
        let ch = &html[i..i + ch_len];

        match state {
            State::Text => {
                if ch == "<" {
                    if html[i..].starts_with("<!--") {
                        state = State::Comment;
                        i += 4;
                        continue;
                    }
                    tag.clear();
                    state = State::Tag;
                } else {
                    out.push_str(ch);
                }
            }
            State::Tag => {
                if ch == ">" {
                    let is_closing = tag.starts_with('/');
                    let name = tag
                        .trim_start_matches('/')
                        .split_whitespace()
                        .next()
                        .unwrap_or("")
                        .to_lowercase();
                    state = match name.as_str() {
                        "script" if !is_closing => State::Skip("</script>"),
                        "style" if !is_closing => State::Skip("</style>"),
                        _ => State::Text,
                    };
                    if is_block_tag(&name) || name == "br" {
                        out.push('\n');
                    }
                } else {
                    tag.push_str(ch);
                }
            }
            State::Comment => {
                if html[i..].starts_with("-->") {
                    state = State::Text;
                    i += 3;
                    continue;
                }
            }
            State::Skip(closer) => {
                let c = closer.as_bytes();
                if bytes.len() - i >= c.len() && bytes[i..i + c.len()].eq_ignore_ascii_case(c) {
                    i += c.len();
                    state = State::Text;
                    out.push('\n');
                    continue;
                }
            }
        }
        i += ch_len;
    }

    // Collapse horizontal whitespace per line, keep blank-line structure.
    let mut cleaned = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        let line = decode_entities(line.trim());
        if line.is_empty() {
            blank_run += 1;
            if blank_run <= 1 && !cleaned.is_empty() {
                cleaned.push('\n');
            }
        } else {
            blank_run = 0;
            let words: Vec<&str> = line.split_whitespace().collect();
            cleaned.push_str(&words.join(" "));
            cleaned.push('\n');
        }
    }
    cleaned.trim_end().to_string()
}

fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "section"
            | "article"
            | "li"
            | "ul"
            | "ol"
            | "table"
            | "tr"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "blockquote"
            | "pre"
    )
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        0..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}
