//! Chat service: one request, one routed turn.
//!
//! Loads the conversation's recent history, routes the turn, persists it,
//! and records analytics. Routing itself never fails; errors returned here
//! come from storage.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use faq_harness_core::models::{ConsentState, DocumentId, Turn};
use faq_harness_core::router::TurnRouter;
use faq_harness_core::traits::HistoryStore;

use crate::stats::{SqliteUsage, ACTIVITY_CHAT};

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub state: ConsentState,
    pub attributed_document_ids: Vec<DocumentId>,
    /// The fetched history window plus this turn.
    pub chat_history: Vec<Turn>,
}

pub struct ChatService {
    router: TurnRouter,
    history: Arc<dyn HistoryStore>,
    usage: SqliteUsage,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        router: TurnRouter,
        history: Arc<dyn HistoryStore>,
        usage: SqliteUsage,
        history_limit: usize,
    ) -> Self {
        Self {
            router,
            history,
            usage,
            history_limit,
        }
    }

    pub async fn chat(&self, conversation_id: &str, input: &str) -> Result<ChatResponse> {
        let recent = self
            .history
            .fetch_recent(conversation_id, self.history_limit)
            .await
            .context("Failed to load conversation history")?;

        let outcome = self.router.handle_turn(input, recent).await;

        if let Some(turn) = outcome.turn() {
            self.history.append(conversation_id, turn).await?;
        }
        self.usage
            .record_usage(conversation_id, &outcome.attributed_document_ids)
            .await?;
        self.usage
            .record_activity(conversation_id, ACTIVITY_CHAT)
            .await?;

        info!(
            conversation = %conversation_id,
            state = outcome.state.label(),
            documents = ?outcome.attributed_document_ids,
            "chat turn complete"
        );

        Ok(ChatResponse {
            response: outcome.output,
            state: outcome.state,
            attributed_document_ids: outcome.attributed_document_ids,
            chat_history: outcome.updated_history,
        })
    }
}
