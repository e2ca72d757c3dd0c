//! Document administration.
//!
//! Uploads, activation toggles and deletion. Every mutation rebuilds the
//! index for the new active set before returning and reports the result.
//! A failed rebuild is reported alongside the change; the catalog change
//! itself is kept.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use faq_harness_core::models::{Document, DocumentId};
use faq_harness_core::traits::DocumentCatalog;

use crate::catalog::SqliteCatalog;
use crate::config::IndexConfig;
use crate::extract;
use crate::index::{IndexManager, IndexReport};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unsupported file type: {0} (expected .pdf, .md or .txt)")]
    UnsupportedType(String),
    #[error("file is {size} bytes; the limit is {max} bytes")]
    TooLarge { size: u64, max: u64 },
    #[error("a document named '{0}' already exists")]
    DuplicateName(String),
    #[error("document {0} not found")]
    NotFound(DocumentId),
    #[error("cannot read {path}: {source}")]
    Source {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A catalog change plus the index rebuild it triggered.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation<T> {
    #[serde(flatten)]
    pub value: T,
    pub index: IndexReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentBody {
    pub document: Document,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedBody {
    pub deleted: Document,
}

pub struct DocumentAdmin {
    catalog: SqliteCatalog,
    index: Arc<IndexManager>,
    uploads_dir: PathBuf,
    max_upload_bytes: u64,
}

impl DocumentAdmin {
    pub fn new(catalog: SqliteCatalog, index: Arc<IndexManager>, config: &IndexConfig) -> Self {
        Self {
            catalog,
            index,
            uploads_dir: config.uploads_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub async fn list(&self) -> Result<Vec<Document>, AdminError> {
        Ok(self.catalog.list().await?)
    }

    /// Copy `source` into the uploads directory and register it, inactive.
    pub async fn upload(&self, source: &Path) -> Result<Mutation<DocumentBody>, AdminError> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| AdminError::UnsupportedType(source.display().to_string()))?;
        if !extract::is_supported(source) {
            return Err(AdminError::UnsupportedType(name));
        }

        let size = tokio::fs::metadata(source)
            .await
            .map_err(|e| AdminError::Source {
                path: source.display().to_string(),
                source: e,
            })?
            .len();
        if size > self.max_upload_bytes {
            return Err(AdminError::TooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }

        if self.catalog.find_by_name(&name).await?.is_some() {
            return Err(AdminError::DuplicateName(name));
        }

        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .map_err(|e| AdminError::Source {
                path: self.uploads_dir.display().to_string(),
                source: e,
            })?;
        let dest = self.uploads_dir.join(&name);
        tokio::fs::copy(source, &dest)
            .await
            .map_err(|e| AdminError::Source {
                path: source.display().to_string(),
                source: e,
            })?;

        let document = match self.catalog.insert(&name, &dest).await {
            Ok(doc) => doc,
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(e.into());
            }
        };
        info!(id = document.id, name = %document.name, bytes = size, "document uploaded");

        let index = self.rebuild_report().await?;
        Ok(Mutation {
            value: DocumentBody { document },
            index,
        })
    }

    pub async fn set_active(
        &self,
        id: DocumentId,
        active: bool,
    ) -> Result<Mutation<DocumentBody>, AdminError> {
        let document = self
            .catalog
            .set_active(id, active)
            .await?
            .ok_or(AdminError::NotFound(id))?;
        info!(id, active, "document activation changed");

        let index = self.rebuild_report().await?;
        Ok(Mutation {
            value: DocumentBody { document },
            index,
        })
    }

    /// Remove the catalog row, then the backing file.
    pub async fn delete(&self, id: DocumentId) -> Result<Mutation<DeletedBody>, AdminError> {
        let document = self
            .catalog
            .delete(id)
            .await?
            .ok_or(AdminError::NotFound(id))?;

        // The row goes first; a file left behind is only logged.
        if let Err(e) = tokio::fs::remove_file(&document.path).await {
            warn!(path = %document.path.display(), error = %e, "could not remove document file");
        }
        info!(id, name = %document.name, "document deleted");

        let index = self.rebuild_report().await?;
        Ok(Mutation {
            value: DeletedBody { deleted: document },
            index,
        })
    }

    /// Forced rebuild of the index for the current active set.
    pub async fn rebuild_index(&self) -> Result<IndexReport, AdminError> {
        self.rebuild_report().await
    }

    async fn rebuild_report(&self) -> Result<IndexReport, AdminError> {
        let active = self.catalog.list_active().await?;
        Ok(match self.index.rebuild(&active).await {
            Ok(status) => status.report(),
            Err(e) => {
                warn!(error = %e, "index rebuild failed");
                IndexReport::failed(&e)
            }
        })
    }
}
