//! Core data models used throughout the job finder.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the indexing and retrieval pipeline.

use serde::Serialize;

/// Raw text read from a source file by the loader.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Path of the file the text came from.
    pub source: String,
    pub content_type: String,
    pub text: String,
}

/// A chunk of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub source: String,
    pub position: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by the vector index, best match first.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub source: String,
    pub position: i64,
    pub text: String,
    /// Cosine similarity between the query and the chunk.
    pub score: f32,
}

/// Citation attached to a generated answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCitation {
    /// Leading excerpt of the chunk text.
    pub content: String,
    pub metadata: serde_json::Value,
    /// Basename of the source file, or `"Unknown"`.
    pub source_name: String,
}

/// How a search request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Answered,
    NotIndexed,
    NoMatches,
    Failed,
}

/// Result of [`RagService::search`](crate::rag::RagService::search).
///
/// Always well-formed: failures are reported through `status` and a
/// readable `result` text, never as an error.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub result: String,
    pub source_documents: Vec<SourceCitation>,
    pub status: SearchStatus,
}

impl SearchResponse {
    pub fn answered(result: String, source_documents: Vec<SourceCitation>) -> Self {
        Self {
            result,
            source_documents,
            status: SearchStatus::Answered,
        }
    }

    /// A response with an explanatory message and no sources.
    pub fn message(status: SearchStatus, result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            source_documents: Vec::new(),
            status,
        }
    }
}

/// Uploaded document record stored in SQLite.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub id: i64,
    pub title: String,
    pub file_path: String,
    pub content_type: String,
    /// Unix timestamp (seconds).
    pub uploaded_at: i64,
    pub uploaded_by: String,
}

impl StoredDocument {
    pub fn filename(&self) -> String {
        std::path::Path::new(&self.file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.file_path.clone())
    }
}

/// One recorded search, newest first when listed.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub user: Option<String>,
    pub query: String,
    pub result_summary: String,
    pub created_at: i64,
}
