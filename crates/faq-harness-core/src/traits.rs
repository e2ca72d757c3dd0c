//! Capability traits at the boundary of the answer pipeline.
//!
//! The router and the application services only see these interfaces.
//! Storage, HTTP, model providers, and the index backend are supplied by
//! the caller.
//!
//! | Trait | Role |
//! |-------|------|
//! | [`DocumentCatalog`] | Active documents and id → name resolution |
//! | [`HistoryStore`] | Recent turns per conversation, append-only |
//! | [`Retriever`] | Nearest chunks for a query, or "unavailable" |
//! | [`Generator`] | Free-form answer from context and history |
//! | [`Escalator`] | Human handoff |

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, DocumentId, RetrievedChunk, Turn};

/// Read access to the admin-curated document set.
#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    /// All documents currently flagged active.
    async fn list_active(&self) -> Result<Vec<Document>>;

    /// Names for the given ids. Ids that do not resolve are simply absent.
    async fn document_names(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, String>>;
}

/// Persistent conversation history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The last `limit` turns of a conversation, oldest first.
    async fn fetch_recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>>;

    async fn append(&self, conversation_id: &str, turn: &Turn) -> Result<()>;
}

/// Outcome of a retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// Chunks ordered by descending similarity (possibly empty).
    Hits(Vec<RetrievedChunk>),
    /// No index to search, with a reason for logs.
    Unavailable(String),
}

/// Semantic lookup over the active documents.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Retrieval>;
}

/// Opaque text-completion capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an answer to `user_input`.
    ///
    /// `context` is the attributed retrieval context (may be empty);
    /// `history` is already trimmed to the context budget.
    async fn complete(
        &self,
        system_instructions: &str,
        context: &str,
        history: &[Turn],
        user_input: &str,
    ) -> Result<String>;
}

/// Hands a conversation over to human support.
#[async_trait]
pub trait Escalator: Send + Sync {
    /// Always succeeds; returns the acknowledgment shown to the user.
    async fn handoff(&self, user_input: &str) -> String;
}
