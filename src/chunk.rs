//! Fixed-window text chunker.
//!
//! Splits document text into windows of `chunk_chars` characters with
//! `overlap_chars` of overlap between consecutive chunks. The final chunk
//! may be shorter; a document no longer than the window yields exactly one
//! chunk equal to the full text. Windows are measured in characters, not
//! bytes, so multi-byte text never splits inside a code point.

use sha2::{Digest, Sha256};

/// Split `text` into overlapping character windows.
///
/// An overlap of `chunk_chars` or more is clamped to `chunk_chars - 1`,
/// since a window that never advances would never terminate.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    if text.is_empty() || chunk_chars == 0 {
        return Vec::new();
    }
    let overlap_chars = overlap_chars.min(chunk_chars - 1);

    // Byte offsets of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n_chars = bounds.len() - 1;

    if n_chars <= chunk_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_chars).min(n_chars);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end == n_chars {
            break;
        }
        start = end - overlap_chars;
    }
    chunks
}

/// Deterministic chunk id: hash of source identity and chunk index, so
/// re-ingesting the same source overwrites rather than duplicates.
pub fn chunk_id(source: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"::");
    hasher.update(chunk_index.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
