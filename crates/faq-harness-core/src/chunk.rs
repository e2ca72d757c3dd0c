//! Paragraph-boundary text chunker.
//!
//! Splits extracted document content into [`Chunk`]s that respect a
//! `max_tokens` limit. Splitting prefers paragraph boundaries (`\n\n`), then
//! newlines and spaces, and only cuts inside a word when nothing else fits.
//!
//! Each chunk carries its parent document id, a contiguous index, and a
//! SHA-256 hash of its text.
//!
//! # Example
//!
//! ```rust
//! use faq_harness_core::chunk::chunk_text;
//!
//! let chunks = chunk_text(7, "How do I reset my password?\n\nUse the login page.", 700);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].document_id, 7);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Chunk, DocumentId};

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting `max_tokens`.
///
/// Blank content yields no chunks: a document with nothing to say must not
/// put an empty vector into the index.
pub fn chunk_text(document_id: DocumentId, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + 2 + trimmed.len()
        };
        if would_be > max_chars && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let cut = split_point(remaining, max_chars);
                let piece = remaining[..cut].trim();
                if !piece.is_empty() {
                    pieces.push(piece.to_string());
                }
                remaining = &remaining[cut..];
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
        .iter()
        .enumerate()
        .map(|(i, text)| make_chunk(document_id, i as i64, text))
        .collect()
}

/// Byte offset at which to cut `s` so the head is at most `max_chars` bytes,
/// preferring a newline or space and always landing on a char boundary.
fn split_point(s: &str, max_chars: usize) -> usize {
    if s.len() <= max_chars {
        return s.len();
    }
    let mut limit = max_chars;
    while !s.is_char_boundary(limit) {
        limit -= 1;
    }
    if limit == 0 {
        // A single char wider than the budget.
        return s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len());
    }
    let head = &s[..limit];
    head.rfind('\n')
        .or_else(|| head.rfind(' '))
        .map(|pos| pos + 1)
        .unwrap_or(limit)
}

fn make_chunk(document_id: DocumentId, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    Chunk {
        document_id,
        chunk_index: index,
        text: text.to_string(),
        hash: format!("{:x}", hasher.finalize()),
    }
}
