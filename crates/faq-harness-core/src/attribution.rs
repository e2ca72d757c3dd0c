//! Source attribution for retrieved chunks.
//!
//! Maps retrieved chunks back to the documents they came from, keeps the
//! documents in first-seen order, and renders the `From A, B:` preamble
//! that prefixes FAQ answers.

use std::collections::HashMap;

use crate::models::{DocumentId, RetrievedChunk};

/// Label used when a document id no longer resolves to a name
/// (e.g. deleted after indexing).
pub const UNKNOWN_DOCUMENT: &str = "Unknown";

/// Default per-chunk character budget for direct answers.
pub const DEFAULT_SNIPPET_CHARS: usize = 300;

/// The documents that informed an answer, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attribution {
    pub document_ids: Vec<DocumentId>,
    pub names: Vec<String>,
}

impl Attribution {
    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }

    /// `From A, B:`
    pub fn preamble(&self) -> String {
        format!("From {}:", self.names.join(", "))
    }
}

/// Unique document ids of `hits`, in first-seen order.
pub fn unique_document_ids(hits: &[RetrievedChunk]) -> Vec<DocumentId> {
    let mut ids: Vec<DocumentId> = Vec::new();
    for hit in hits {
        if !ids.contains(&hit.document_id) {
            ids.push(hit.document_id);
        }
    }
    ids
}

/// Attribute `hits` to their documents, resolving names through `names`.
pub fn attribute(hits: &[RetrievedChunk], names: &HashMap<DocumentId, String>) -> Attribution {
    let document_ids = unique_document_ids(hits);
    let names = document_ids
        .iter()
        .map(|id| {
            names
                .get(id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string())
        })
        .collect();
    Attribution {
        document_ids,
        names,
    }
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Render the direct FAQ answer: the preamble followed by each truncated
/// chunk, separated by blank lines.
pub fn render_answer(
    attribution: &Attribution,
    hits: &[RetrievedChunk],
    snippet_chars: usize,
) -> String {
    let body = hits
        .iter()
        .map(|h| truncate_snippet(&h.text, snippet_chars))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{}", attribution.preamble(), body)
}

/// Render untruncated context for the generation step. Empty when nothing
/// was retrieved.
pub fn render_context(attribution: &Attribution, hits: &[RetrievedChunk]) -> String {
    if hits.is_empty() {
        return String::new();
    }
    let body = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{}", attribution.preamble(), body)
}
