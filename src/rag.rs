//! Retrieval-augmented answering over the indexed job descriptions and
//! resumes.
//!
//! [`RagService::search`] never fails: every outcome, including missing
//! configuration and remote errors, becomes a [`SearchResponse`] whose
//! `status` says which path was taken.

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::generation::{GenerationClient, GenerationError};
use crate::models::{RetrievedChunk, SearchResponse, SearchStatus, SourceCitation};
use crate::vector_store::{IndexStatus, VectorStore};

pub const NOT_INDEXED_MESSAGE: &str = "I don't have any job descriptions or resumes indexed yet. Please upload some documents so I can help you!";
pub const NO_MATCHES_MESSAGE: &str =
    "I couldn't find any specific matches in the indexed documents for your query.";

const PROMPT_PREAMBLE: &str = "[INST] You are a professional Career Assistant and Job Matcher.
Use the following context (job descriptions, resumes, and career data) to answer the user's question.
If the context doesn't contain the answer, say that you don't have enough information in your current database to answer specifically, but offer general advice.";

const PROMPT_CLOSING: &str = "Please provide a detailed, professional, and helpful response. If matching a job to a resume, highlight specific skills that match.
ANSWER: [/INST]";

pub struct RagService {
    config: Arc<Config>,
    store: VectorStore,
    generator: GenerationClient,
}

impl RagService {
    pub fn new(config: Arc<Config>, embedder: Arc<dyn Embedder>, generator: GenerationClient) -> Self {
        let store = VectorStore::new(config.clone(), embedder);
        Self {
            config,
            store,
            generator,
        }
    }

    /// Opens or builds the index. A failure is logged and leaves the
    /// service in the not-indexed state; the next search retries.
    pub async fn warm_up(&self) {
        match self.store.load_or_build().await {
            Ok(Some(index)) => info!(chunks = index.len(), "index ready"),
            Ok(None) => info!("no documents indexed yet"),
            Err(e) => error!(error = %e, "failed to initialize index"),
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn index_status(&self) -> IndexStatus {
        self.store.status()
    }

    /// Answers `query` from the indexed documents.
    pub async fn search(&self, query: &str) -> SearchResponse {
        // The snapshot taken here serves the whole search, even if a reload
        // swaps the cell meanwhile.
        let index = match self.store.ensure_index().await {
            Ok(Some(index)) => index,
            Ok(None) => {
                return SearchResponse::message(SearchStatus::NotIndexed, NOT_INDEXED_MESSAGE)
            }
            Err(e) => {
                error!(error = %e, "index build failed during search");
                return SearchResponse::message(SearchStatus::NotIndexed, NOT_INDEXED_MESSAGE);
            }
        };

        let retrieval = &self.config.retrieval;
        let chunks = match self
            .store
            .retrieve_from(&index, query, retrieval.k, retrieval.fetch_k)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                Vec::new()
            }
        };
        if chunks.is_empty() {
            return SearchResponse::message(SearchStatus::NoMatches, NO_MATCHES_MESSAGE);
        }

        let prompt = build_prompt(query, &chunks);
        match self.generator.generate(&prompt).await {
            Ok(answer) => {
                info!(sources = chunks.len(), "search answered");
                let citations = chunks
                    .iter()
                    .map(|c| citation(c, self.config.retrieval.excerpt_chars))
                    .collect();
                SearchResponse::answered(answer, citations)
            }
            Err(e @ GenerationError::MissingToken { .. }) => {
                warn!(error = %e, "generation not configured");
                SearchResponse::message(SearchStatus::Failed, format!("Configuration Error: {}", e))
            }
            Err(e) => {
                error!(error = %e, "generation failed");
                SearchResponse::message(
                    SearchStatus::Failed,
                    format!("The RAG engine encountered a processing error: {}", e),
                )
            }
        }
    }

    /// Retrieval only, with the configured `k`/`fetch_k`.
    pub async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<RetrievedChunk>> {
        let retrieval = &self.config.retrieval;
        self.store.retrieve(query, retrieval.k, retrieval.fetch_k).await
    }

    /// Deletes and rebuilds the index. Returns `false` on failure.
    pub async fn reload(&self) -> bool {
        match self.store.destroy_and_rebuild().await {
            Ok(index) => {
                info!(
                    chunks = index.as_ref().map(|i| i.len()).unwrap_or(0),
                    "index reloaded"
                );
                true
            }
            Err(e) => {
                error!(error = %e, "index reload failed");
                false
            }
        }
    }
}

/// Renders the instruction prompt around the retrieved chunks.
pub fn build_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| format!("--- Document: {} ---\n{}", c.source, c.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\nCONTEXT:\n{}\n\nQUESTION:\n{}\n\n{}",
        PROMPT_PREAMBLE, context, query, PROMPT_CLOSING
    )
}

fn citation(chunk: &RetrievedChunk, excerpt_chars: usize) -> SourceCitation {
    let excerpt: String = chunk.text.chars().take(excerpt_chars).collect();
    SourceCitation {
        content: format!("{}...", excerpt),
        metadata: serde_json::json!({
            "source": chunk.source,
            "position": chunk.position,
        }),
        source_name: source_name(&chunk.source),
    }
}

fn source_name(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::embedding::HashEmbedder;
    use crate::generation::{Transport, TransportError, TransportResponse};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedTransport {
        status: u16,
        body: String,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn post_json(
            &self,
            _url: &str,
            _token: &str,
            body: &Value,
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            self.prompts
                .lock()
                .unwrap()
                .push(body["inputs"].as_str().unwrap_or_default().to_string());
            Ok(TransportResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn chunk(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            source: source.to_string(),
            position: 0,
            text: text.to_string(),
            score: 1.0,
        }
    }

    fn service(
        root: &Path,
        status: u16,
        body: &str,
        token: Option<&str>,
    ) -> (RagService, Arc<Config>, Arc<Mutex<Vec<String>>>) {
        let mut config = Config::with_root(root);
        config.index.release_delay_ms = 0;
        let config = Arc::new(config);
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let transport = FixedTransport {
            status,
            body: body.to_string(),
            prompts: prompts.clone(),
        };
        let generator = GenerationClient::new(
            &GenerationConfig::default(),
            Box::new(transport),
            token.map(str::to_string),
        );
        let service = RagService::new(config.clone(), Arc::new(HashEmbedder::new(128)), generator);
        (service, config, prompts)
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }

        fn dims(&self) -> usize {
            8
        }

        async fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding backend unavailable")
        }
    }

    fn write_doc(config: &Config, name: &str, body: &str) {
        let dir = config.paths.documents_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt(
            "Which jobs need Rust?",
            &[chunk("/d/a.txt", "Rust engineer"), chunk("/d/b.txt", "Go engineer")],
        );
        assert!(prompt.starts_with("[INST] You are a professional Career Assistant"));
        assert!(prompt.contains(
            "CONTEXT:\n--- Document: /d/a.txt ---\nRust engineer\n\n--- Document: /d/b.txt ---\nGo engineer"
        ));
        assert!(prompt.contains("QUESTION:\nWhich jobs need Rust?\n"));
        assert!(prompt.ends_with("ANSWER: [/INST]"));
    }

    #[test]
    fn test_citation_excerpt_and_name() {
        let long = "x".repeat(1000);
        let c = citation(&chunk("/media/documents/resume.txt", &long), 400);
        assert_eq!(c.content.chars().count(), 403);
        assert!(c.content.ends_with("..."));
        assert_eq!(c.source_name, "resume.txt");
        assert_eq!(c.metadata["source"], "/media/documents/resume.txt");
        assert_eq!(c.metadata["position"], 0);

        let short = citation(&chunk("", "short"), 400);
        assert_eq!(short.content, "short...");
        assert_eq!(short.source_name, "Unknown");
    }

    #[tokio::test]
    async fn test_not_indexed_when_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (service, _, prompts) = service(tmp.path(), 200, "[]", Some("t"));
        let response = service.search("anything").await;
        assert_eq!(response.status, SearchStatus::NotIndexed);
        assert_eq!(response.result, NOT_INDEXED_MESSAGE);
        assert!(response.source_documents.is_empty());
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_builds_index_lazily_and_answers() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (service, config, prompts) =
            service(tmp.path(), 200, r#"[{"generated_text":" Apply to Acme. "}]"#, Some("t"));
        write_doc(&config, "acme.txt", "Senior Python Developer, 5 years Django experience");

        let response = service.search("Find me a senior python developer job").await;
        assert_eq!(response.status, SearchStatus::Answered);
        assert_eq!(response.result, "Apply to Acme.");
        assert_eq!(response.source_documents.len(), 1);
        assert_eq!(response.source_documents[0].source_name, "acme.txt");
        assert!(prompts.lock().unwrap()[0].contains("Django experience"));
    }

    #[tokio::test]
    async fn test_missing_token_is_configuration_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (service, config, _) = service(tmp.path(), 200, "[]", None);
        write_doc(&config, "a.txt", "Data scientist, PyTorch");
        service.warm_up().await;

        let response = service.search("data scientist").await;
        assert_eq!(response.status, SearchStatus::Failed);
        assert!(response.result.starts_with("Configuration Error:"));
        assert!(response.source_documents.is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_is_processing_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (service, config, _) = service(tmp.path(), 500, "boom", Some("t"));
        write_doc(&config, "a.txt", "Mobile developer, Kotlin");
        service.warm_up().await;

        let response = service.search("kotlin").await;
        assert_eq!(response.status, SearchStatus::Failed);
        assert!(response
            .result
            .starts_with("The RAG engine encountered a processing error:"));
    }

    #[tokio::test]
    async fn test_reload_reflects_new_documents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (service, config, _) = service(tmp.path(), 200, "[]", Some("t"));
        write_doc(&config, "a.txt", "UX designer, Figma");
        service.warm_up().await;
        assert_eq!(service.index_status().sources, 1);

        write_doc(&config, "b.txt", "Security analyst, SIEM");
        assert!(service.reload().await);
        assert_eq!(service.index_status().sources, 2);
    }

    #[tokio::test]
    async fn test_failed_rebuild_reports_false_and_not_indexed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::with_root(tmp.path());
        config.index.release_delay_ms = 0;
        let config = Arc::new(config);
        write_doc(&config, "a.txt", "Cloud architect, AWS");

        let prompts = Arc::new(Mutex::new(Vec::new()));
        let generator = GenerationClient::new(
            &GenerationConfig::default(),
            Box::new(FixedTransport {
                status: 200,
                body: "[]".to_string(),
                prompts: prompts.clone(),
            }),
            Some("t".to_string()),
        );
        let service = RagService::new(config.clone(), Arc::new(BrokenEmbedder), generator);

        assert!(!service.reload().await);
        assert!(service.store().current().is_none());

        let response = service.search("cloud architect").await;
        assert_eq!(response.status, SearchStatus::NotIndexed);
        assert_eq!(response.result, NOT_INDEXED_MESSAGE);
        assert!(response.source_documents.is_empty());
        assert!(prompts.lock().unwrap().is_empty());
    }
}
