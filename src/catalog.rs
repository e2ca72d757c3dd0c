//! SQLite-backed document catalog.
//!
//! Owns the `documents` table: the admin-curated set of knowledge sources
//! and their active flags. Implements the core [`DocumentCatalog`] trait for
//! the answer pipeline and adds the CRUD used by [`crate::admin`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use faq_harness_core::models::{Document, DocumentId};
use faq_harness_core::traits::DocumentCatalog;

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

fn row_to_document(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        name: row.get("name"),
        path: PathBuf::from(row.get::<String, _>("path")),
        active: row.get::<i64, _>("active") != 0,
        created_at: row.get("created_at"),
    }
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new, inactive document.
    pub async fn insert(&self, name: &str, path: &Path) -> Result<Document> {
        let now = chrono::Utc::now().timestamp();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO documents (name, path, active, created_at) VALUES (?, ?, 0, ?) RETURNING id",
        )
        .bind(name)
        .bind(path.to_string_lossy().to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to insert document '{}'", name))?;

        Ok(Document {
            id,
            name: name.to_string(),
            path: path.to_path_buf(),
            active: false,
            created_at: now,
        })
    }

    pub async fn get(&self, id: DocumentId) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT id, name, path, active, created_at FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Document>> {
        let row =
            sqlx::query("SELECT id, name, path, active, created_at FROM documents WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    /// Every document, oldest first.
    pub async fn list(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT id, name, path, active, created_at FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Flip the active flag. Returns the updated document, or `None` if the
    /// id is unknown.
    pub async fn set_active(&self, id: DocumentId, active: bool) -> Result<Option<Document>> {
        let result = sqlx::query("UPDATE documents SET active = ? WHERE id = ?")
            .bind(active as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Remove the row. Returns the deleted document, or `None` if the id is
    /// unknown.
    pub async fn delete(&self, id: DocumentId) -> Result<Option<Document>> {
        let Some(doc) = self.get(id).await? else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(Some(doc))
    }
}

#[async_trait]
impl DocumentCatalog for SqliteCatalog {
    async fn list_active(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, name, path, active, created_at FROM documents WHERE active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn document_names(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, name FROM documents WHERE id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<i64, _>("id"), r.get::<String, _>("name")))
            .collect())
    }
}
