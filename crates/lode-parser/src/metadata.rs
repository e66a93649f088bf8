use std::path::Path;
use std::time::UNIX_EPOCH;

use lode_core::{FileKind, Metadata};

use crate::detect::{decode_text, is_binary, title_from_text};

/// Read format-specific properties without parsing full content.
///
/// Never fatal: anything unreadable degrades to `Metadata` with the kind
/// guessed from the extension (or `Other`).
pub fn extract_metadata(path: &Path) -> Metadata {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let kind = FileKind::from_extension(&ext);
    let mime = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string());

    let mut meta = Metadata {
        kind,
        mime,
        ..Default::default()
    };

    // For text-like files a cheap head read yields the title; richer
    // format properties come from the document extractors at parse time.
    if matches!(kind, FileKind::Document | FileKind::Text) && ext != "pdf" {
        if let Ok(head) = read_head(path, 64 * 1024) {
            if !is_binary(&head) {
                let (text, _) = decode_text(&head);
                meta.title = title_from_text(&text);
            }
        }
    }

    meta
}

/// File timestamps as Unix seconds, falling back to 0 / mtime where the
/// platform has no answer.
pub fn file_times(meta: &std::fs::Metadata) -> (i64, i64) {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let ctime = meta
        .created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(mtime);
    (mtime, ctime)
}

fn read_head(path: &Path, max: usize) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut f = std::fs::File::open(path)?;
    let mut buf = vec![0u8; max];
    let mut filled = 0;
    loop {
        let n = f.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }
    buf.truncate(filled);
    Ok(buf)
}
