//! Core data models used throughout FAQ Harness.
//!
//! These types describe the admin-curated documents, the chunks derived from
//! them, and the conversation turns that flow through the answer pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a [`Document`] in the catalog.
pub type DocumentId = i64;

/// An admin-curated knowledge source backed by a file.
///
/// Documents are created inactive; only active documents contribute chunks
/// to the semantic index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Human-readable name, unique across the catalog.
    pub name: String,
    /// Location of the backing content.
    pub path: PathBuf,
    pub active: bool,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: i64,
}

/// A fragment of a document's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: DocumentId,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk returned by a retrieval, with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub document_id: DocumentId,
    pub score: f32,
}

/// Router state after a turn.
///
/// `AwaitingGenerationConsent` is entered right after the system asked
/// whether it should generate an answer; it remembers the question that
/// found no FAQ match so a later "yes" knows what to answer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConsentState {
    #[default]
    Normal,
    AwaitingGenerationConsent { question: String },
}

impl ConsentState {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, ConsentState::AwaitingGenerationConsent { .. })
    }

    /// Stable label used for persistence and API output.
    pub fn label(&self) -> &'static str {
        match self {
            ConsentState::Normal => "normal",
            ConsentState::AwaitingGenerationConsent { .. } => "awaiting_generation_consent",
        }
    }

    /// Rebuild a state from its persisted label and pending question.
    ///
    /// Unknown labels, or an awaiting label without a question, fall back
    /// to [`ConsentState::Normal`] so a damaged row never wedges a
    /// conversation.
    pub fn from_parts(label: &str, question: Option<String>) -> Self {
        match (label, question) {
            ("awaiting_generation_consent", Some(question)) => {
                ConsentState::AwaitingGenerationConsent { question }
            }
            _ => ConsentState::Normal,
        }
    }

    pub fn pending_question(&self) -> Option<&str> {
        match self {
            ConsentState::Normal => None,
            ConsentState::AwaitingGenerationConsent { question } => Some(question),
        }
    }
}

/// One user utterance, the system's response, and the documents that
/// informed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub input: String,
    pub output: String,
    pub document_ids: Vec<DocumentId>,
    /// Router state after this turn.
    pub state: ConsentState,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: i64,
}

impl Turn {
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        document_ids: Vec<DocumentId>,
        state: ConsentState,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            document_ids,
            state,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Result of routing a single turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub output: String,
    /// The history passed in, plus the new turn.
    pub updated_history: Vec<Turn>,
    pub attributed_document_ids: Vec<DocumentId>,
    pub state: ConsentState,
}

impl TurnOutcome {
    /// The turn this outcome appended to the history.
    pub fn turn(&self) -> Option<&Turn> {
        self.updated_history.last()
    }
}
