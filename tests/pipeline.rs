//! End-to-end pipeline behaviour through the library API: indexing,
//! retrieval, generation with a scripted transport, and reloads racing
//! searches.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use job_finder_rag::config::{Config, GenerationConfig};
use job_finder_rag::context::AppContext;
use job_finder_rag::documents::DocumentStore;
use job_finder_rag::embedding::HashEmbedder;
use job_finder_rag::generation::{
    GenerationClient, RetryPolicy, Transport, TransportError, TransportResponse,
};
use job_finder_rag::models::SearchStatus;
use job_finder_rag::rag::{RagService, NOT_INDEXED_MESSAGE};
use job_finder_rag::traits::{ToolContext, ToolRegistry};
use job_finder_rag::vector_store::VectorStore;

struct AlwaysAnswer;

#[async_trait]
impl Transport for AlwaysAnswer {
    async fn post_json(
        &self,
        _url: &str,
        _token: &str,
        _body: &Value,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 200,
            body: r#"[{"generated_text":"The Django role is a strong match."}]"#.to_string(),
        })
    }
}

struct AlwaysWarmingUp;

#[async_trait]
impl Transport for AlwaysWarmingUp {
    async fn post_json(
        &self,
        _url: &str,
        _token: &str,
        _body: &Value,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 503,
            body: "loading".to_string(),
        })
    }
}

fn test_config(root: &Path, release_delay_ms: u64) -> Arc<Config> {
    let mut config = Config::with_root(root);
    config.index.release_delay_ms = release_delay_ms;
    Arc::new(config)
}

fn write_data(config: &Config, name: &str, body: &str) {
    let dir = &config.paths.source_dirs[1];
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), body).unwrap();
}

fn seed_corpus(config: &Config) {
    write_data(
        config,
        "python.txt",
        "Senior Python Developer, 5 years Django experience. Remote, full time.",
    );
    write_data(
        config,
        "chef.txt",
        "Head chef for a seafood restaurant. Menu planning and kitchen management.",
    );
    write_data(
        config,
        "driver.txt",
        "Delivery driver with a clean licence. Weekend availability required.",
    );
}

fn rag(config: Arc<Config>, transport: Box<dyn Transport>) -> RagService {
    let generator = GenerationClient::new(
        &GenerationConfig::default(),
        transport,
        Some("hf_test".to_string()),
    )
    .with_policy(RetryPolicy {
        max_attempts: 3,
        warmup_delay: Duration::from_millis(1),
        connect_backoff: Duration::from_millis(1),
    });
    RagService::new(config, Arc::new(HashEmbedder::new(256)), generator)
}

#[tokio::test]
async fn senior_python_scenario() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path(), 0);
    seed_corpus(&config);
    let service = rag(config, Box::new(AlwaysAnswer));
    service.warm_up().await;

    let response = service.search("Find me a senior python developer job").await;
    assert_eq!(response.status, SearchStatus::Answered);
    assert_eq!(response.result, "The Django role is a strong match.");
    assert!(response
        .source_documents
        .iter()
        .any(|s| s.source_name == "python.txt"));
    assert!(response.source_documents.len() <= 5);
}

#[tokio::test]
async fn empty_state_returns_canned_answer() {
    let tmp = TempDir::new().unwrap();
    let service = rag(test_config(tmp.path(), 0), Box::new(AlwaysAnswer));
    service.warm_up().await;

    let response = service.search("anything at all").await;
    assert_eq!(response.status, SearchStatus::NotIndexed);
    assert_eq!(response.result, NOT_INDEXED_MESSAGE);
    assert!(response.source_documents.is_empty());
}

#[tokio::test]
async fn rebuild_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path(), 0);
    seed_corpus(&config);
    let store = VectorStore::new(config, Arc::new(HashEmbedder::new(256)));

    store.rebuild().await.unwrap();
    let first = store.retrieve("kitchen management chef", 3, 20).await.unwrap();
    store.rebuild().await.unwrap();
    let second = store.retrieve("kitchen management chef", 3, 20).await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn warming_up_endpoint_exhausts_retries() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path(), 0);
    seed_corpus(&config);
    let service = rag(config, Box::new(AlwaysWarmingUp));
    service.warm_up().await;

    let response = service.search("python").await;
    assert_eq!(response.status, SearchStatus::Failed);
    assert!(response
        .result
        .starts_with("The RAG engine encountered a processing error:"));
    assert!(response.result.contains("after 3 attempts"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reload_racing_searches_leaves_a_usable_index() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path(), 50);
    seed_corpus(&config);
    let service = Arc::new(rag(config.clone(), Box::new(AlwaysAnswer)));
    service.warm_up().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            if i % 3 == 0 {
                assert!(service.reload().await);
            } else {
                let response = service.search("senior python developer").await;
                assert!(matches!(
                    response.status,
                    SearchStatus::Answered | SearchStatus::NotIndexed
                ));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let fresh = VectorStore::new(config, Arc::new(HashEmbedder::new(256)));
    let index = fresh.load_or_build().await.unwrap().unwrap();
    assert_eq!(index.source_count(), 3);
}

#[tokio::test]
async fn added_document_is_cited() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path(), 0);
    seed_corpus(&config);
    let documents = DocumentStore::open(&config).await.unwrap();
    let app = AppContext::new(
        config.clone(),
        rag(config, Box::new(AlwaysAnswer)),
        documents,
    );
    app.rag().warm_up().await;

    let outcome = app
        .add_document(
            "Marine Biologist",
            "Marine biologist surveying coral reef ecosystems and plankton.",
            "tester",
        )
        .await;
    assert!(outcome.is_success(), "{}", outcome.message);

    let response = app
        .search_and_record(None, "coral reef ecosystems and plankton")
        .await;
    assert!(response
        .source_documents
        .iter()
        .any(|s| s.source_name == "Marine_Biologist.txt"));
}

#[tokio::test]
async fn search_tool_bounds_query_and_leaves_history_alone() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path(), 0);
    seed_corpus(&config);
    let documents = DocumentStore::open(&config).await.unwrap();
    let app = Arc::new(AppContext::new(
        config.clone(),
        rag(config, Box::new(AlwaysAnswer)),
        documents,
    ));
    let tools = ToolRegistry::with_builtins();
    let search = tools.find("search_jobs").unwrap();
    let ctx = ToolContext::new(app.clone());

    let long_query = format!("python {}", "x".repeat(5000));
    let err = search
        .execute(json!({ "query": long_query }), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must be at most 1000 characters"));

    let answer = search
        .execute(json!({ "query": "senior python developer" }), &ctx)
        .await
        .unwrap();
    assert_eq!(answer, json!("The Django role is a strong match."));
    assert!(app
        .documents()
        .recent_searches(None, 10)
        .await
        .unwrap()
        .is_empty());
}
