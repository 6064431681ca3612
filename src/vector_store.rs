//! Lifecycle of the live vector index.
//!
//! [`VectorStore`] owns the one index the service answers from. It builds
//! the index from the source directories, persists it, reopens it on the
//! next start, and swaps it out on reload.
//!
//! The live index sits in an `RwLock<Option<Arc<VectorIndex>>>`. The lock is
//! only held long enough to clone or replace the `Arc`, so searches never
//! wait on a rebuild. Anything that writes the index directory first takes
//! the async `reload_lock`, which makes rebuilds strictly sequential.

use anyhow::{bail, Result};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::{index_exists, open_index, remove_index, write_index, IndexEntry, VectorIndex};
use crate::loader::load_documents;
use crate::models::{Chunk, RetrievedChunk};

/// Summary of the live index for `/health` and `jobrag status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStatus {
    pub chunks: usize,
    pub sources: usize,
    pub model: Option<String>,
}

pub struct VectorStore {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    current: RwLock<Option<Arc<VectorIndex>>>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl VectorStore {
    /// Creates a store with no live index. Call [`load_or_build`](Self::load_or_build)
    /// to populate it.
    pub fn new(config: Arc<Config>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            current: RwLock::new(None),
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The live index, if any.
    pub fn current(&self) -> Option<Arc<VectorIndex>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, index: Option<Arc<VectorIndex>>) {
        match self.current.write() {
            Ok(mut guard) => *guard = index,
            Err(poisoned) => *poisoned.into_inner() = index,
        }
    }

    pub fn status(&self) -> IndexStatus {
        match self.current() {
            Some(index) => IndexStatus {
                chunks: index.len(),
                sources: index.source_count(),
                model: Some(index.model().to_string()),
            },
            None => IndexStatus {
                chunks: 0,
                sources: 0,
                model: None,
            },
        }
    }

    /// Opens the persisted index, or builds one when it is absent or
    /// unusable.
    pub async fn load_or_build(&self) -> Result<Option<Arc<VectorIndex>>> {
        let _guard = self.reload_lock.lock().await;
        let dir = &self.config.paths.index_dir;

        if index_exists(dir) {
            match self.open_compatible().await {
                Ok(index) => {
                    info!(
                        dir = %dir.display(),
                        chunks = index.len(),
                        model = index.model(),
                        "opened persisted index"
                    );
                    let index = Arc::new(index);
                    self.publish(Some(index.clone()));
                    return Ok(Some(index));
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "persisted index unusable, rebuilding");
                }
            }
        }

        self.build_locked().await
    }

    async fn open_compatible(&self) -> Result<VectorIndex> {
        let index = open_index(&self.config.paths.index_dir).await?;
        if index.model() != self.embedder.model_name() || index.dims() != self.embedder.dims() {
            bail!(
                "index built with {} ({} dims), embedder is {} ({} dims)",
                index.model(),
                index.dims(),
                self.embedder.model_name(),
                self.embedder.dims()
            );
        }
        Ok(index)
    }

    /// Builds a fresh index from every source directory and publishes it.
    ///
    /// Returns `Ok(None)` when there is nothing to index; the persisted
    /// directory is removed in that case.
    pub async fn rebuild(&self) -> Result<Option<Arc<VectorIndex>>> {
        let _guard = self.reload_lock.lock().await;
        self.build_locked().await
    }

    /// Like [`rebuild`](Self::rebuild), but a no-op when another caller
    /// published an index while this one waited for the lock.
    pub async fn ensure_index(&self) -> Result<Option<Arc<VectorIndex>>> {
        if let Some(index) = self.current() {
            return Ok(Some(index));
        }
        let _guard = self.reload_lock.lock().await;
        if let Some(index) = self.current() {
            return Ok(Some(index));
        }
        self.build_locked().await
    }

    /// Tears down the live index and builds a new one.
    ///
    /// The cell is emptied first, then the store waits
    /// `index.release_delay_ms` before deleting the directory. Searches that
    /// already hold the old `Arc` finish against it.
    pub async fn destroy_and_rebuild(&self) -> Result<Option<Arc<VectorIndex>>> {
        let _guard = self.reload_lock.lock().await;

        self.publish(None);
        let delay = Duration::from_millis(self.config.index.release_delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        remove_index(&self.config.paths.index_dir)?;
        info!(dir = %self.config.paths.index_dir.display(), "removed persisted index");

        self.build_locked().await
    }

    /// Embeds `query` and returns up to `k` chunks, best first.
    pub async fn retrieve(&self, query: &str, k: usize, fetch_k: usize) -> Result<Vec<RetrievedChunk>> {
        match self.current() {
            Some(index) => self.retrieve_from(&index, query, k, fetch_k).await,
            None => Ok(Vec::new()),
        }
    }

    /// Like [`retrieve`](Self::retrieve), against a snapshot the caller
    /// already holds. A reload publishing a new index does not affect it.
    pub async fn retrieve_from(
        &self,
        index: &VectorIndex,
        query: &str,
        k: usize,
        fetch_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query).await?;
        Ok(index.search(&query_vec, k, fetch_k, self.config.retrieval.mmr_lambda))
    }

    /// Caller must hold `reload_lock`.
    async fn build_locked(&self) -> Result<Option<Arc<VectorIndex>>> {
        let roots = self.config.paths.source_dirs.clone();
        let docs = tokio::task::spawn_blocking(move || load_documents(&roots)).await?;

        let chunking = &self.config.chunking;
        let chunks: Vec<Chunk> = docs
            .iter()
            .flat_map(|doc| chunk_text(&doc.source, &doc.text, chunking.chunk_size, chunking.overlap))
            .collect();

        let dir = &self.config.paths.index_dir;
        if chunks.is_empty() {
            remove_index(dir)?;
            self.publish(None);
            info!(dir = %dir.display(), "no documents to index");
            return Ok(None);
        }

        let entries = self.embed_chunks(chunks).await?;
        let index = VectorIndex::new(self.embedder.model_name(), self.embedder.dims(), entries);
        write_index(dir, &index).await?;

        info!(
            documents = docs.len(),
            chunks = index.len(),
            model = index.model(),
            "index rebuilt"
        );

        let index = Arc::new(index);
        self.publish(Some(index.clone()));
        Ok(Some(index))
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>> {
        let dims = self.embedder.dims();
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != dims {
                    bail!("embedder returned {} dims, expected {}", vector.len(), dims);
                }
                entries.push(IndexEntry {
                    source: chunk.source.clone(),
                    position: chunk.position,
                    text: chunk.text.clone(),
                    hash: chunk.hash.clone(),
                    vector,
                });
            }
        }

        Ok(entries)
    }
}
