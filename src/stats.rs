//! Usage analytics.
//!
//! Records which documents fed each answer and one activity row per chat
//! turn, and reports them: per-document usage counts (unused documents
//! included) and per-conversation activity. `faq stats` prints both.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use faq_harness_core::models::DocumentId;

use crate::config::Config;
use crate::db;
use crate::index::INDEX_FILE;

pub const ACTIVITY_CHAT: &str = "chat";

/// How often a document has informed an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentUsage {
    pub document_id: DocumentId,
    pub name: String,
    pub active: bool,
    pub uses: i64,
    pub last_used_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationActivity {
    pub conversation_id: String,
    pub chats: i64,
    pub last_activity_at: i64,
}

#[derive(Clone)]
pub struct SqliteUsage {
    pool: SqlitePool,
}

impl SqliteUsage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Count one use for each document. Ids deleted since the answer was
    /// produced are ignored.
    pub async fn record_usage(&self, conversation_id: &str, document_ids: &[DocumentId]) -> Result<()> {
        if document_ids.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for id in document_ids {
            sqlx::query(
                r#"
                INSERT INTO document_usage (document_id, conversation_id, used_at)
                SELECT ?, ?, ? WHERE EXISTS (SELECT 1 FROM documents WHERE id = ?)
                "#,
            )
            .bind(id)
            .bind(conversation_id)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn record_activity(&self, conversation_id: &str, kind: &str) -> Result<()> {
        sqlx::query("INSERT INTO activity (conversation_id, kind, created_at) VALUES (?, ?, ?)")
            .bind(conversation_id)
            .bind(kind)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every document with its use count, most used first.
    pub async fn document_usage(&self) -> Result<Vec<DocumentUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.name, d.active,
                   COUNT(u.id) AS uses,
                   MAX(u.used_at) AS last_used_at
            FROM documents d
            LEFT JOIN document_usage u ON u.document_id = d.id
            GROUP BY d.id
            ORDER BY uses DESC, d.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentUsage {
                document_id: row.get("id"),
                name: row.get("name"),
                active: row.get::<i64, _>("active") != 0,
                uses: row.get("uses"),
                last_used_at: row.get("last_used_at"),
            })
            .collect())
    }

    /// Chat counts per conversation, most recently active first.
    pub async fn conversation_activity(&self) -> Result<Vec<ConversationActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id,
                   SUM(CASE WHEN kind = ? THEN 1 ELSE 0 END) AS chats,
                   MAX(created_at) AS last_activity_at
            FROM activity
            GROUP BY conversation_id
            ORDER BY last_activity_at DESC, conversation_id ASC
            "#,
        )
        .bind(ACTIVITY_CHAT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ConversationActivity {
                conversation_id: row.get("conversation_id"),
                chats: row.get("chats"),
                last_activity_at: row.get("last_activity_at"),
            })
            .collect())
    }
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let usage = SqliteUsage::new(pool.clone());

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;
    let active_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE active = 1")
        .fetch_one(&pool)
        .await?;
    let total_turns: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM turns")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let index_path = config.index.dir.join(INDEX_FILE);
    let index_display = match std::fs::metadata(&index_path) {
        Ok(m) => format!("{} ({})", index_path.display(), format_bytes(m.len())),
        Err(_) => "not built".to_string(),
    };

    let documents = usage.document_usage().await?;
    let conversations = usage.conversation_activity().await?;

    println!("FAQ Harness — Stats");
    println!("===================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!("  Index:          {}", index_display);
    println!();
    println!("  Documents:      {} ({} active)", total_docs, active_docs);
    println!("  Conversations:  {}", conversations.len());
    println!("  Turns:          {}", total_turns);

    if !documents.is_empty() {
        println!();
        println!("  Document usage:");
        println!(
            "  {:>4}  {:<32} {:>6} {:>6}   {}",
            "ID", "NAME", "ACTIVE", "USES", "LAST USED"
        );
        println!("  {}", "-".repeat(76));
        for d in &documents {
            let last_used = match d.last_used_at {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:>4}  {:<32} {:>6} {:>6}   {}",
                d.document_id,
                d.name,
                if d.active { "yes" } else { "no" },
                d.uses,
                last_used
            );
        }
    }

    if !conversations.is_empty() {
        println!();
        println!("  Recent conversations:");
        println!("  {:<38} {:>6}   {}", "CONVERSATION", "CHATS", "LAST ACTIVE");
        println!("  {}", "-".repeat(76));
        for c in conversations.iter().take(10) {
            println!(
                "  {:<38} {:>6}   {}",
                c.conversation_id,
                c.chats,
                format_ts_relative(c.last_activity_at)
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
pub(crate) fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
