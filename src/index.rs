//! Document index manager.
//!
//! Keeps a semantic index over the chunks of the currently active
//! documents, persisted as a single `index.json` in the index directory.
//!
//! # Freshness
//!
//! [`IndexManager::ensure_fresh`] rebuilds when any of these hold:
//!
//! - `index.json` is missing
//! - its membership fingerprint differs from the active set
//! - an active document's file was modified after the index was built
//! - the embedding model changed
//! - the caller forces it
//!
//! Otherwise the current handle is reused, from memory when possible and
//! from disk otherwise. An active set that produced no text is remembered
//! the same way, so it is not extracted again until it changes. A file that cannot be loaded (corrupt, wrong format
//! version, unreadable) is rebuilt in place; the failure is logged, never
//! returned.
//!
//! # Concurrency
//!
//! Rebuilds are serialized across processes by an exclusive `fs2` lock on
//! `index.lock`, held only while loading, embedding and persisting. After
//! the lock is acquired freshness is checked again, since another process
//! may have just finished the same rebuild. The index is written to
//! `index.json.tmp` and renamed into place.
//!
//! Handles are immutable [`Arc`] snapshots. A rebuild swaps a new handle in
//! under a short write lock; queries holding an old handle keep working.

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Instant, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

use faq_harness_core::chunk::chunk_text;
use faq_harness_core::embedding::{embed_query, Embedder};
use faq_harness_core::models::{Chunk, Document, DocumentId, RetrievedChunk};
use faq_harness_core::traits::{DocumentCatalog, Retrieval, Retriever};
use faq_harness_core::vector::{FlatIndex, VectorIndex};

use crate::extract;

pub const INDEX_FILE: &str = "index.json";
const INDEX_TMP_FILE: &str = "index.json.tmp";
const LOCK_FILE: &str = "index.lock";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to acquire index lock {path}: {message}")]
    Lock { path: PathBuf, message: String },
    #[error("index file is corrupt: {0}")]
    Corrupt(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path, source: std::io::Error) -> IndexError {
    IndexError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ============ On-disk format ============

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    format_version: u32,
    built_at_ms: i64,
    model: String,
    dims: usize,
    fingerprint: String,
    chunks: Vec<StoredChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredChunk {
    document_id: DocumentId,
    chunk_index: i64,
    text: String,
    hash: String,
    vector: Vec<f32>,
}

/// Metadata of a built index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMeta {
    pub built_at_ms: i64,
    pub model: String,
    pub dims: usize,
    pub fingerprint: String,
    pub chunk_count: usize,
    pub document_count: usize,
}

// ============ Handle ============

/// An immutable, queryable snapshot of the index.
pub struct IndexHandle {
    meta: IndexMeta,
    chunks: Vec<Chunk>,
    vectors: Box<dyn VectorIndex>,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl IndexHandle {
    fn from_file(file: IndexFile) -> Result<Self, IndexError> {
        if file.format_version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "format version {} (expected {})",
                file.format_version, FORMAT_VERSION
            )));
        }

        let mut chunks = Vec::with_capacity(file.chunks.len());
        let mut vectors = Vec::with_capacity(file.chunks.len());
        let mut documents: Vec<DocumentId> = Vec::new();
        for stored in file.chunks {
            if stored.vector.len() != file.dims {
                return Err(IndexError::Corrupt(format!(
                    "chunk {}/{} has {} dims (expected {})",
                    stored.document_id,
                    stored.chunk_index,
                    stored.vector.len(),
                    file.dims
                )));
            }
            if !documents.contains(&stored.document_id) {
                documents.push(stored.document_id);
            }
            vectors.push(stored.vector);
            chunks.push(Chunk {
                document_id: stored.document_id,
                chunk_index: stored.chunk_index,
                text: stored.text,
                hash: stored.hash,
            });
        }

        Ok(Self {
            meta: IndexMeta {
                built_at_ms: file.built_at_ms,
                model: file.model,
                dims: file.dims,
                fingerprint: file.fingerprint,
                chunk_count: chunks.len(),
                document_count: documents.len(),
            },
            chunks,
            vectors: Box::new(FlatIndex::new(vectors)),
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

// ============ Status ============

/// Outcome of [`IndexManager::ensure_fresh`].
#[derive(Debug, Clone)]
pub enum IndexStatus {
    Ready(Arc<IndexHandle>),
    NoActiveDocuments,
    /// Active documents exist but none yielded any chunk.
    Unusable { reason: String },
}

/// Serializable summary of an [`IndexStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<IndexMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IndexReport {
    /// Report for a rebuild that returned an error.
    pub fn failed(error: &IndexError) -> Self {
        Self {
            status: "rebuild_failed",
            meta: None,
            reason: Some(error.to_string()),
        }
    }

    pub fn describe(&self) -> String {
        match (&self.meta, &self.reason) {
            (Some(meta), _) => format!(
                "{} ({} chunks from {} documents, model {})",
                self.status, meta.chunk_count, meta.document_count, meta.model
            ),
            (None, Some(reason)) => format!("{}: {}", self.status, reason),
            (None, None) => self.status.replace('_', " "),
        }
    }
}

impl IndexStatus {
    pub fn report(&self) -> IndexReport {
        match self {
            IndexStatus::Ready(handle) => IndexReport {
                status: "ready",
                meta: Some(handle.meta().clone()),
                reason: None,
            },
            IndexStatus::NoActiveDocuments => IndexReport {
                status: "no_active_documents",
                meta: None,
                reason: None,
            },
            IndexStatus::Unusable { reason } => IndexReport {
                status: "unusable",
                meta: None,
                reason: Some(reason.clone()),
            },
        }
    }

    /// One-line summary for the CLI.
    pub fn describe(&self) -> String {
        self.report().describe()
    }
}

// ============ Fingerprint & staleness ============

/// SHA-256 over the sorted `(id, path)` pairs of the active set.
pub fn fingerprint(documents: &[Document]) -> String {
    let mut pairs: Vec<(DocumentId, String)> = documents
        .iter()
        .map(|d| (d.id, d.path.to_string_lossy().to_string()))
        .collect();
    pairs.sort();

    let mut hasher = Sha256::new();
    for (id, path) in &pairs {
        hasher.update(id.to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn modified_ms(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as i64)
}

// ============ Cross-process lock ============

struct IndexLock {
    file: std::fs::File,
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl IndexLock {
    async fn acquire(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(LOCK_FILE);
        let lock_path = path.clone();
        let started = Instant::now();

        let lock = tokio::task::spawn_blocking(move || -> Result<IndexLock, IndexError> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|e| io_error(&lock_path, e))?;
            file.lock_exclusive().map_err(|e| IndexError::Lock {
                path: lock_path.clone(),
                message: e.to_string(),
            })?;
            Ok(IndexLock { file })
        })
        .await
        .map_err(|e| IndexError::Lock {
            path: path.clone(),
            message: e.to_string(),
        })??;

        debug!(wait_ms = started.elapsed().as_millis() as u64, "index lock acquired");
        Ok(lock)
    }
}

// ============ Manager ============

/// A build whose active documents produced no chunks.
#[derive(Debug, Clone)]
struct UnusableBuild {
    meta: IndexMeta,
    reason: String,
}

pub struct IndexManager {
    dir: PathBuf,
    max_tokens: usize,
    batch_size: usize,
    embedder: Arc<dyn Embedder>,
    current: RwLock<Option<Arc<IndexHandle>>>,
    unusable: RwLock<Option<UnusableBuild>>,
}

impl IndexManager {
    pub fn new(
        dir: impl Into<PathBuf>,
        max_tokens: usize,
        batch_size: usize,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            dir: dir.into(),
            max_tokens,
            batch_size: batch_size.max(1),
            embedder,
            current: RwLock::new(None),
            unusable: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn current(&self) -> Option<Arc<IndexHandle>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the current handle. Any remembered unusable build is
    /// forgotten.
    fn swap(&self, handle: Option<Arc<IndexHandle>>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = handle;
        self.set_unusable(None);
    }

    fn set_unusable(&self, build: Option<UnusableBuild>) {
        *self
            .unusable
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = build;
    }

    /// The remembered `Unusable` status, while `documents` is still the set
    /// it was built from.
    fn cached_unusable(&self, documents: &[Document], fingerprint: &str) -> Option<IndexStatus> {
        let guard = self
            .unusable
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let build = guard.as_ref()?;
        self.is_fresh(&build.meta, documents, fingerprint)
            .then(|| IndexStatus::Unusable {
                reason: build.reason.clone(),
            })
    }

    fn is_fresh(&self, meta: &IndexMeta, documents: &[Document], fingerprint: &str) -> bool {
        if meta.fingerprint != fingerprint {
            debug!("index membership changed");
            return false;
        }
        if meta.model != self.embedder.model_name() {
            debug!(built = %meta.model, current = %self.embedder.model_name(), "embedding model changed");
            return false;
        }
        // A missing file cannot be newer; the rebuild already skipped it.
        if let Some(doc) = documents
            .iter()
            .find(|d| modified_ms(&d.path).is_some_and(|ms| ms > meta.built_at_ms))
        {
            debug!(document = %doc.name, "document modified after index build");
            return false;
        }
        true
    }

    /// Read `index.json`. `Ok(None)` when it does not exist.
    async fn load_from_disk(&self) -> Result<Option<Arc<IndexHandle>>, IndexError> {
        let path = self.index_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let file: IndexFile =
            serde_json::from_slice(&bytes).map_err(|e| IndexError::Corrupt(e.to_string()))?;
        Ok(Some(Arc::new(IndexHandle::from_file(file)?)))
    }

    /// The fresh handle for `documents`, without rebuilding. `Ok(None)` when
    /// a rebuild is needed.
    async fn fresh_handle(
        &self,
        documents: &[Document],
        fingerprint: &str,
    ) -> Result<Option<Arc<IndexHandle>>, IndexError> {
        if let Some(handle) = self.current() {
            if self.is_fresh(handle.meta(), documents, fingerprint) {
                return Ok(Some(handle));
            }
        }
        match self.load_from_disk().await? {
            Some(handle) if self.is_fresh(handle.meta(), documents, fingerprint) => {
                self.swap(Some(handle.clone()));
                Ok(Some(handle))
            }
            _ => Ok(None),
        }
    }

    /// Make sure the index reflects `documents` (the active set) and return
    /// its status.
    pub async fn ensure_fresh(
        &self,
        documents: &[Document],
        force: bool,
    ) -> Result<IndexStatus, IndexError> {
        let fingerprint = fingerprint(documents);
        let mut force = force;

        if !force {
            if documents.is_empty() && self.current().is_none() && !self.index_path().exists() {
                return Ok(IndexStatus::NoActiveDocuments);
            }
            if let Some(status) = self.cached_unusable(documents, &fingerprint) {
                return Ok(status);
            }
            match self.fresh_handle(documents, &fingerprint).await {
                Ok(Some(handle)) => return Ok(IndexStatus::Ready(handle)),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "index load failed; forcing rebuild");
                    force = true;
                }
            }
        }

        self.rebuild_locked(documents, &fingerprint, force).await
    }

    /// Unconditional rebuild for the given active set.
    pub async fn rebuild(&self, documents: &[Document]) -> Result<IndexStatus, IndexError> {
        self.ensure_fresh(documents, true).await
    }

    /// Metadata of the index currently on disk, if any.
    pub async fn status(&self) -> Result<Option<IndexMeta>, IndexError> {
        Ok(self
            .load_from_disk()
            .await?
            .map(|handle| handle.meta().clone()))
    }

    async fn rebuild_locked(
        &self,
        documents: &[Document],
        fingerprint: &str,
        force: bool,
    ) -> Result<IndexStatus, IndexError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let _lock = IndexLock::acquire(&self.dir).await?;

        if !force {
            if let Some(status) = self.cached_unusable(documents, fingerprint) {
                return Ok(status);
            }
            if let Ok(Some(handle)) = self.fresh_handle(documents, fingerprint).await {
                debug!("index rebuilt by another process while waiting for the lock");
                return Ok(IndexStatus::Ready(handle));
            }
        }

        if documents.is_empty() {
            self.remove_index_file().await?;
            self.swap(None);
            info!("no active documents; index cleared");
            return Ok(IndexStatus::NoActiveDocuments);
        }

        let started = Instant::now();
        let built_at_ms = chrono::Utc::now().timestamp_millis();
        let chunks = self.load_chunks(documents).await?;
        if chunks.is_empty() {
            self.remove_index_file().await?;
            self.swap(None);
            let reason = format!(
                "none of the {} active documents produced any text",
                documents.len()
            );
            warn!(%reason, "index unusable");
            self.set_unusable(Some(UnusableBuild {
                meta: IndexMeta {
                    built_at_ms,
                    model: self.embedder.model_name().to_string(),
                    dims: 0,
                    fingerprint: fingerprint.to_string(),
                    chunk_count: 0,
                    document_count: documents.len(),
                },
                reason: reason.clone(),
            }));
            return Ok(IndexStatus::Unusable { reason });
        }

        let vectors = self.embed_chunks(&chunks).await?;
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);

        let file = IndexFile {
            format_version: FORMAT_VERSION,
            built_at_ms,
            model: self.embedder.model_name().to_string(),
            dims,
            fingerprint: fingerprint.to_string(),
            chunks: chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| StoredChunk {
                    document_id: chunk.document_id,
                    chunk_index: chunk.chunk_index,
                    text: chunk.text,
                    hash: chunk.hash,
                    vector,
                })
                .collect(),
        };
        self.write_index_file(&file).await?;

        let handle = Arc::new(IndexHandle::from_file(file)?);
        info!(
            chunks = handle.meta.chunk_count,
            documents = handle.meta.document_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index rebuilt"
        );
        self.swap(Some(handle.clone()));
        Ok(IndexStatus::Ready(handle))
    }

    /// Extract and chunk every active document. Unreadable documents are
    /// skipped with a warning.
    async fn load_chunks(&self, documents: &[Document]) -> Result<Vec<Chunk>, IndexError> {
        let documents = documents.to_vec();
        let max_tokens = self.max_tokens;

        tokio::task::spawn_blocking(move || {
            let mut chunks = Vec::new();
            for doc in &documents {
                match extract::load_text(&doc.path) {
                    Ok(text) => {
                        let doc_chunks = chunk_text(doc.id, &text, max_tokens);
                        if doc_chunks.is_empty() {
                            warn!(document = %doc.name, "document has no text; skipping");
                        }
                        chunks.extend(doc_chunks);
                    }
                    Err(e) => warn!(document = %doc.name, error = %e, "skipping unreadable document"),
                }
            }
            chunks
        })
        .await
        .map_err(|e| io_error(&self.dir, std::io::Error::other(e.to_string())))
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| IndexError::Embedding(format!("{:#}", e)))?;
            if embedded.len() != texts.len() {
                return Err(IndexError::Embedding(format!(
                    "{} vectors returned for {} chunks",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
        }

        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            return Err(IndexError::Embedding(
                "embedding vectors are empty or of inconsistent length".to_string(),
            ));
        }
        let expected = self.embedder.dims();
        if expected > 0 && dims != expected {
            return Err(IndexError::Embedding(format!(
                "model {} returned {} dims, expected {}",
                self.embedder.model_name(),
                dims,
                expected
            )));
        }
        Ok(vectors)
    }

    async fn write_index_file(&self, file: &IndexFile) -> Result<(), IndexError> {
        let bytes = serde_json::to_vec(file)?;
        let tmp = self.dir.join(INDEX_TMP_FILE);
        let path = self.index_path();
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn remove_index_file(&self) -> Result<(), IndexError> {
        let path = self.index_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// The `k` chunks most similar to `text`, best first.
    pub async fn query(
        &self,
        handle: &IndexHandle,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        if k == 0 || handle.is_empty() {
            return Ok(Vec::new());
        }
        let query = embed_query(self.embedder.as_ref(), text)
            .await
            .map_err(|e| IndexError::Embedding(format!("{:#}", e)))?;
        if query.len() != handle.meta.dims {
            return Err(IndexError::Embedding(format!(
                "query has {} dims but the index has {}",
                query.len(),
                handle.meta.dims
            )));
        }

        Ok(handle
            .vectors
            .search(&query, k)
            .into_iter()
            .filter_map(|(position, score)| {
                handle.chunks.get(position).map(|chunk| RetrievedChunk {
                    text: chunk.text.clone(),
                    document_id: chunk.document_id,
                    score,
                })
            })
            .collect())
    }
}

// ============ Retriever adapter ============

/// Answers retrievals from the active catalog, rebuilding lazily when the
/// index is stale.
pub struct IndexRetriever {
    catalog: Arc<dyn DocumentCatalog>,
    index: Arc<IndexManager>,
}

impl IndexRetriever {
    pub fn new(catalog: Arc<dyn DocumentCatalog>, index: Arc<IndexManager>) -> Self {
        Self { catalog, index }
    }
}

#[async_trait]
impl Retriever for IndexRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Retrieval> {
        let documents = self.catalog.list_active().await?;
        match self.index.ensure_fresh(&documents, false).await? {
            IndexStatus::Ready(handle) => {
                Ok(Retrieval::Hits(self.index.query(&handle, query, k).await?))
            }
            IndexStatus::NoActiveDocuments => {
                Ok(Retrieval::Unavailable("no active documents".to_string()))
            }
            IndexStatus::Unusable { reason } => Ok(Retrieval::Unavailable(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Letter-frequency vectors; counts embed calls.
    #[derive(Default)]
    struct LetterEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn doc(dir: &Path, id: DocumentId, name: &str, text: &str) -> Document {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        Document {
            id,
            name: name.to_string(),
            path,
            active: true,
            created_at: 0,
        }
    }

    fn manager(dir: &Path, embedder: Arc<LetterEmbedder>) -> IndexManager {
        IndexManager::new(dir.join("index"), 250, 8, embedder)
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        let tmp = TempDir::new().unwrap();
        let a = doc(tmp.path(), 1, "a.md", "a");
        let b = doc(tmp.path(), 2, "b.md", "b");
        assert_eq!(
            fingerprint(&[a.clone(), b.clone()]),
            fingerprint(&[b.clone(), a.clone()])
        );
        assert_ne!(fingerprint(&[a.clone()]), fingerprint(&[a, b]));
    }

    #[tokio::test]
    async fn test_ensure_fresh_reuses_index() {
        let tmp = TempDir::new().unwrap();
        let embedder = Arc::new(LetterEmbedder::default());
        let index = manager(tmp.path(), embedder.clone());
        let docs = vec![doc(tmp.path(), 1, "a.md", "apples are red")];

        let first = index.ensure_fresh(&docs, false).await.unwrap();
        assert!(matches!(first, IndexStatus::Ready(_)));
        let calls = embedder.calls.load(Ordering::SeqCst);

        let second = index.ensure_fresh(&docs, false).await.unwrap();
        assert!(matches!(second, IndexStatus::Ready(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);

        // A second manager loads the same file without embedding documents.
        let other = manager(tmp.path(), embedder.clone());
        assert!(matches!(
            other.ensure_fresh(&docs, false).await.unwrap(),
            IndexStatus::Ready(_)
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_modified_document_triggers_rebuild() {
        let tmp = TempDir::new().unwrap();
        let embedder = Arc::new(LetterEmbedder::default());
        let index = manager(tmp.path(), embedder.clone());
        let docs = vec![doc(tmp.path(), 1, "a.md", "old text")];
        index.ensure_fresh(&docs, false).await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);

        std::fs::write(&docs[0].path, "new text").unwrap();
        let future = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&docs[0].path)
            .unwrap()
            .set_modified(future)
            .unwrap();

        let IndexStatus::Ready(handle) = index.ensure_fresh(&docs, false).await.unwrap() else {
            panic!("expected ready index");
        };
        assert!(embedder.calls.load(Ordering::SeqCst) > calls);
        assert_eq!(handle.chunks()[0].text, "new text");
    }

    #[tokio::test]
    async fn test_empty_active_set_clears_index() {
        let tmp = TempDir::new().unwrap();
        let index = manager(tmp.path(), Arc::default());
        let docs = vec![doc(tmp.path(), 1, "a.md", "text")];
        index.ensure_fresh(&docs, false).await.unwrap();
        assert!(index.dir().join(INDEX_FILE).exists());

        let status = index.ensure_fresh(&[], false).await.unwrap();
        assert!(matches!(status, IndexStatus::NoActiveDocuments));
        assert!(!index.dir().join(INDEX_FILE).exists());
        assert!(index.status().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_documents_are_unusable() {
        let tmp = TempDir::new().unwrap();
        let index = manager(tmp.path(), Arc::default());
        let mut missing = doc(tmp.path(), 2, "gone.md", "x");
        missing.path = tmp.path().join("does-not-exist.md");
        let docs = vec![doc(tmp.path(), 1, "blank.md", "   \n\n  "), missing];

        let status = index.ensure_fresh(&docs, false).await.unwrap();
        assert!(matches!(status, IndexStatus::Unusable { .. }));
        assert_eq!(status.report().status, "unusable");
    }

    #[tokio::test]
    async fn test_unusable_set_is_not_rebuilt_until_it_changes() {
        let tmp = TempDir::new().unwrap();
        let embedder = Arc::new(LetterEmbedder::default());
        let index = manager(tmp.path(), embedder.clone());
        let docs = vec![doc(tmp.path(), 1, "blank.md", "  \n\n ")];

        let first = index.ensure_fresh(&docs, false).await.unwrap();
        assert!(matches!(first, IndexStatus::Unusable { .. }));

        // New content with an mtime older than the build is not seen as a
        // change, so a rebuild would show up as a Ready index.
        std::fs::write(&docs[0].path, "apples are red").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&docs[0].path)
            .unwrap()
            .set_modified(UNIX_EPOCH + std::time::Duration::from_secs(1))
            .unwrap();

        let second = index.ensure_fresh(&docs, false).await.unwrap();
        let IndexStatus::Unusable { reason } = &second else {
            panic!("expected the remembered unusable status, got {}", second.describe());
        };
        assert!(reason.contains("produced any text"));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

        // A forced rebuild ignores the remembered outcome.
        assert!(matches!(
            index.rebuild(&docs).await.unwrap(),
            IndexStatus::Ready(_)
        ));
        assert!(matches!(
            index.ensure_fresh(&docs, false).await.unwrap(),
            IndexStatus::Ready(_)
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unusable_set_rebuilds_after_membership_change() {
        let tmp = TempDir::new().unwrap();
        let index = manager(tmp.path(), Arc::default());
        let blank = doc(tmp.path(), 1, "blank.md", "");
        assert!(matches!(
            index.ensure_fresh(&[blank.clone()], false).await.unwrap(),
            IndexStatus::Unusable { .. }
        ));

        let docs = vec![blank, doc(tmp.path(), 2, "a.md", "apples")];
        assert!(matches!(
            index.ensure_fresh(&docs, false).await.unwrap(),
            IndexStatus::Ready(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_rebuilds_embed_once() {
        let tmp = TempDir::new().unwrap();
        let embedder = Arc::new(LetterEmbedder::default());
        let first = manager(tmp.path(), embedder.clone());
        let second = manager(tmp.path(), embedder.clone());
        let docs = vec![doc(tmp.path(), 1, "a.md", "apples are red")];

        let (a, b) = tokio::join!(
            first.ensure_fresh(&docs, false),
            second.ensure_fresh(&docs, false)
        );
        assert!(matches!(a.unwrap(), IndexStatus::Ready(_)));
        assert!(matches!(b.unwrap(), IndexStatus::Ready(_)));
        // One chunk fits one batch; the loser of the lock reuses the file.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert!(!first.dir().join(INDEX_TMP_FILE).exists());
    }

    #[tokio::test]
    async fn test_old_handle_survives_rebuild() {
        let tmp = TempDir::new().unwrap();
        let index = manager(tmp.path(), Arc::default());
        let old_docs = vec![doc(tmp.path(), 1, "a.md", "apples are red")];
        let IndexStatus::Ready(old) = index.ensure_fresh(&old_docs, false).await.unwrap() else {
            panic!("expected ready index");
        };

        let new_docs = vec![doc(tmp.path(), 2, "z.md", "zebras are striped")];
        let IndexStatus::Ready(new) = index.rebuild(&new_docs).await.unwrap() else {
            panic!("expected ready index");
        };
        assert_eq!(new.chunks()[0].document_id, 2);

        let hits = index.query(&old, "apples", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, 1);
        assert_eq!(hits[0].text, "apples are red");
    }

    #[tokio::test]
    async fn test_embedder_dims_mismatch_fails_rebuild() {
        struct Misreported(LetterEmbedder);

        #[async_trait]
        impl Embedder for Misreported {
            fn model_name(&self) -> &str {
                "letters"
            }
            fn dims(&self) -> usize {
                3
            }
            async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
                self.0.embed(texts).await
            }
        }

        let tmp = TempDir::new().unwrap();
        let docs = vec![doc(tmp.path(), 1, "a.md", "apples")];
        let index = IndexManager::new(
            tmp.path().join("index"),
            250,
            8,
            Arc::new(Misreported(LetterEmbedder::default())),
        );

        let err = index.ensure_fresh(&docs, false).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(ref m) if m.contains("expected 3")));
        assert!(!index.dir().join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_query_bounds_and_ordering() {
        let tmp = TempDir::new().unwrap();
        let index = manager(tmp.path(), Arc::default());
        let docs = vec![
            doc(tmp.path(), 1, "a.md", "aaaa\n\nbbbb\n\ncccc"),
            doc(tmp.path(), 2, "b.md", "zzzz"),
        ];
        let IndexStatus::Ready(handle) = index.ensure_fresh(&docs, false).await.unwrap() else {
            panic!("expected ready index");
        };
        assert_eq!(handle.meta().dims, 26);

        assert!(index.query(&handle, "zzz", 0).await.unwrap().is_empty());
        let hits = index.query(&handle, "zzz", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(index.query(&handle, "zzz", 50).await.unwrap().len() <= handle.len());
    }

    #[tokio::test]
    async fn test_model_change_triggers_rebuild() {
        struct Renamed(LetterEmbedder);

        #[async_trait]
        impl Embedder for Renamed {
            fn model_name(&self) -> &str {
                "letters-v2"
            }
            fn dims(&self) -> usize {
                26
            }
            async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
                self.0.embed(texts).await
            }
        }

        let tmp = TempDir::new().unwrap();
        let docs = vec![doc(tmp.path(), 1, "a.md", "text")];
        manager(tmp.path(), Arc::default())
            .ensure_fresh(&docs, false)
            .await
            .unwrap();

        let renamed = Arc::new(Renamed(LetterEmbedder::default()));
        let index = IndexManager::new(tmp.path().join("index"), 250, 8, renamed.clone());
        index.ensure_fresh(&docs, false).await.unwrap();
        assert_eq!(renamed.0.calls.load(Ordering::SeqCst), 1);
        assert_eq!(index.status().await.unwrap().unwrap().model, "letters-v2");
    }
}
