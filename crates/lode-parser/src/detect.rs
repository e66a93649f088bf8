use encoding_rs::{Encoding, UTF_8};

/// Heuristic binary check over the first 8 KiB: NUL bytes or a high share
/// of non-text bytes mean "not parseable as text".
pub fn is_binary(content: &[u8]) -> bool {
    let sample = &content[..content.len().min(8192)];
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let suspicious = sample
        .iter()
        .filter(|&&b| b < 0x09 || (0x0E..0x20).contains(&b))
        .count();
    suspicious * 10 > sample.len()
}

/// Decode file bytes to text: BOM sniff first, UTF-8 preferred, lossy
/// fallback through the detected encoding. Returns the text and the
/// encoding name actually used.
pub fn decode_text(content: &[u8]) -> (String, &'static str) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(content) {
        let (text, _, _) = encoding.decode(&content[bom_len..]);
        return (text.into_owned(), encoding.name());
    }
    match std::str::from_utf8(content) {
        Ok(s) => (s.to_string(), UTF_8.name()),
        Err(_) => {
            let (text, encoding, _) = UTF_8.decode(content);
            let _ = encoding;
            (text.into_owned(), "utf-8-lossy")
        }
    }
}

/// Title heuristic: the first markdown heading, else the first non-empty
/// line, trimmed and capped at 200 characters.
pub fn title_from_text(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let title = line.trim_start_matches('#').trim();
        if title.is_empty() {
            continue;
        }
        return Some(lode_core::truncate_chars(title, 200).to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_byte_means_binary() {
        assert!(is_binary(b"abc\0def"));
        assert!(!is_binary(b"plain old text\n"));
        assert!(!is_binary(b""));
    }

    #[test]
    fn mostly_control_bytes_means_binary() {
        let junk: Vec<u8> = (0..100).map(|i| if i % 2 == 0 { 0x01 } else { b'a' }).collect();
        assert!(is_binary(&junk));
    }

    #[test]
    fn decode_utf8_plain() {
        let (text, enc) = decode_text("héllo wörld".as_bytes());
        assert_eq!(text, "héllo wörld");
        assert_eq!(enc, "UTF-8");
    }

    #[test]
    fn decode_with_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("hello".as_bytes());
        let (text, _) = decode_text(&bytes);
        assert_eq!(text, "hello");
    }

    #[test]
    fn decode_invalid_utf8_is_lossy_not_fatal() {
        let bytes = vec![b'o', b'k', 0xFF, 0xFE, b'!'];
        let (text, enc) = decode_text(&bytes);
        assert!(text.starts_with("ok"));
        assert!(text.ends_with('!'));
        assert_eq!(enc, "utf-8-lossy");
    }

    #[test]
    fn title_prefers_heading() {
        assert_eq!(
            title_from_text("\n\n# My Document\nbody text").as_deref(),
            Some("My Document")
        );
        assert_eq!(
            title_from_text("first line\nsecond").as_deref(),
            Some("first line")
        );
        assert_eq!(title_from_text("\n  \n"), None);
    }

    #[test]
    fn title_is_capped() {
        let long = "x".repeat(500);
        let title = title_from_text(&long).unwrap();
        assert_eq!(title.chars().count(), 200);
    }
}
