//! SQLite-backed conversation history.
//!
//! Turns are append-only. The router state after each turn is stored with
//! it, so the session state of a conversation is always the state of its
//! last row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use faq_harness_core::models::{ConsentState, DocumentId, Turn};
use faq_harness_core::traits::HistoryStore;

#[derive(Clone)]
pub struct SqliteHistory {
    pool: SqlitePool,
}

fn row_to_turn(row: &SqliteRow) -> Turn {
    let ids_json: String = row.get("document_ids");
    // A damaged id list only loses attribution, not the turn.
    let document_ids: Vec<DocumentId> = serde_json::from_str(&ids_json).unwrap_or_default();
    let state = ConsentState::from_parts(
        &row.get::<String, _>("state"),
        row.get::<Option<String>, _>("pending_question"),
    );
    Turn {
        input: row.get("input"),
        output: row.get("output"),
        document_ids,
        state,
        created_at: row.get("created_at"),
    }
}

impl SqliteHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The whole conversation, oldest first.
    pub async fn fetch_all(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            r#"
            SELECT input, output, document_ids, state, pending_question, created_at
            FROM turns
            WHERE conversation_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_turn).collect())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn fetch_recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            r#"
            SELECT input, output, document_ids, state, pending_question, created_at
            FROM turns
            WHERE conversation_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns: Vec<Turn> = rows.iter().map(row_to_turn).collect();
        turns.reverse();
        Ok(turns)
    }

    async fn append(&self, conversation_id: &str, turn: &Turn) -> Result<()> {
        let ids_json = serde_json::to_string(&turn.document_ids)?;
        sqlx::query(
            r#"
            INSERT INTO turns
                (conversation_id, input, output, document_ids, state, pending_question, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(&turn.input)
        .bind(&turn.output)
        .bind(ids_json)
        .bind(turn.state.label())
        .bind(turn.state.pending_question())
        .bind(turn.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to append turn to conversation {}", conversation_id))?;
        Ok(())
    }
}
