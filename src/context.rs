//! Shared application state.
//!
//! [`AppContext`] is built once at startup and shared behind an `Arc` by
//! the HTTP handlers, the MCP bridge, and the CLI commands. It ties the RAG
//! service to the document store so that every document change is followed
//! by a full index rebuild.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::documents::DocumentStore;
use crate::embedding::create_embedder;
use crate::generation::GenerationClient;
use crate::models::{SearchResponse, StoredDocument};
use crate::rag::RagService;

/// Result of a mutating operation, as reported to API and tool callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Outcome {
    pub status: &'static str,
    pub message: String,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

pub struct AppContext {
    config: Arc<Config>,
    rag: RagService,
    documents: DocumentStore,
}

impl AppContext {
    /// Creates the embedder, generation client, and document store.
    ///
    /// Embedder initialization failure is returned as an error; the index
    /// is not opened until [`RagService::warm_up`] or the first search.
    pub async fn from_config(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let embedder = create_embedder(&config.embedding)?;
        let generator = GenerationClient::from_config(&config.generation)?;
        if !generator.has_token() {
            warn!(
                vars = ?config.generation.token_env,
                "no generation token set; searches will report a configuration error"
            );
        }
        let documents = DocumentStore::open(&config).await?;
        let rag = RagService::new(config.clone(), embedder, generator);
        Ok(Self::new(config, rag, documents))
    }

    pub fn new(config: Arc<Config>, rag: RagService, documents: DocumentStore) -> Self {
        Self {
            config,
            rag,
            documents,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rag(&self) -> &RagService {
        &self.rag
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Trims `query` and checks it against `server.max_query_chars`.
    /// Every caller-facing search entry point goes through this.
    pub fn check_query<'a>(&self, query: &'a str) -> Result<&'a str> {
        let query = query.trim();
        if query.is_empty() {
            bail!("query must not be empty");
        }
        let max_chars = self.config.server.max_query_chars;
        if query.chars().count() > max_chars {
            bail!("query must be at most {} characters", max_chars);
        }
        Ok(query)
    }

    /// Runs a search and, when `user` is known, records it in the history
    /// table. A failure to record is logged and does not affect the
    /// response.
    pub async fn search_and_record(&self, user: Option<&str>, query: &str) -> SearchResponse {
        let response = self.rag.search(query).await;
        if let Some(user) = user {
            if let Err(e) = self
                .documents
                .record_search(user, query, &response.result)
                .await
            {
                warn!(user, error = %e, "failed to record search history");
            }
        }
        response
    }

    /// Stores a new text document and rebuilds the index.
    pub async fn add_document(&self, title: &str, content: &str, owner: &str) -> Outcome {
        match self.store_and_reindex(title, content, owner).await {
            Ok(doc) => {
                info!(id = doc.id, title = %doc.title, "document added and indexed");
                Outcome::success(format!("Successfully added and indexed document: {}", title))
            }
            Err(e) => {
                warn!(title, error = %e, "failed to add document");
                Outcome::error(format!("Error adding document: {}", e))
            }
        }
    }

    async fn store_and_reindex(&self, title: &str, content: &str, owner: &str) -> Result<StoredDocument> {
        let doc = self.documents.add(title, content, owner).await?;
        if !self.rag.reload().await {
            anyhow::bail!("document stored but the index rebuild failed");
        }
        Ok(doc)
    }

    /// Deletes a document and rebuilds the index. `Ok(None)` when the id is
    /// unknown.
    pub async fn delete_document(&self, id: i64) -> Result<Option<Outcome>> {
        if !self.documents.delete(id).await? {
            return Ok(None);
        }
        if self.rag.reload().await {
            Ok(Some(Outcome::success(format!("Deleted document {}", id))))
        } else {
            Ok(Some(Outcome::error(format!(
                "Deleted document {} but the index rebuild failed",
                id
            ))))
        }
    }

    /// Rebuilds the index from scratch.
    pub async fn reindex(&self) -> Outcome {
        if self.rag.reload().await {
            let status = self.rag.index_status();
            Outcome::success(format!(
                "Index rebuilt: {} chunks from {} documents",
                status.chunks, status.sources
            ))
        } else {
            Outcome::error("Index rebuild failed; see server logs")
        }
    }

    /// Formats the document listing returned by `list_available_documents`.
    pub async fn document_listing(&self) -> Result<String> {
        let docs = self.documents.list().await?;
        if docs.is_empty() {
            return Ok("No documents found in the database.".to_string());
        }

        let lines: Vec<String> = docs
            .iter()
            .map(|d| format!("- {} (Uploaded: {})", d.title, format_date(d.uploaded_at)))
            .collect();
        Ok(format!("Indexed Documents:\n{}", lines.join("\n")))
    }
}

fn format_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}
