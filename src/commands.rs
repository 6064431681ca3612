//! Implementations of the `jobrag` subcommands.
//!
//! Each `run_*` function prints its result to stdout and returns an error
//! for the CLI to report.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::context::AppContext;
use crate::documents::DocumentStore;
use crate::extract::{content_type_for_extension, extract_text};
use crate::models::SearchStatus;

/// Creates the data directories and the application database.
pub async fn run_init(config: &Config) -> Result<()> {
    for dir in &config.paths.source_dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::create_dir_all(config.paths.documents_dir())?;
    if let Some(parent) = config.paths.index_dir.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = DocumentStore::open(config).await?;
    store.close().await;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_search(app: &AppContext, query: &str, json: bool) -> Result<()> {
    let query = app.check_query(query)?;

    app.rag().warm_up().await;
    let response = app.search_and_record(Some("cli"), query).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.result);
    if !response.source_documents.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in response.source_documents.iter().enumerate() {
            println!("{}. {}", i + 1, source.source_name);
        }
    }

    if response.status == SearchStatus::Failed {
        bail!("search failed");
    }
    Ok(())
}

/// Retrieval without generation; useful to inspect what the model would see.
pub async fn run_retrieve(app: &AppContext, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    app.rag().warm_up().await;
    if app.rag().store().current().is_none() {
        println!("No documents indexed.");
        return Ok(());
    }

    let retrieval = &app.config().retrieval;
    let k = k.unwrap_or(retrieval.k).max(1);
    let chunks = app
        .rag()
        .store()
        .retrieve(query.trim(), k, retrieval.fetch_k.max(k))
        .await?;

    if chunks.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            chunk.score,
            chunk.source,
            chunk.position
        );
        let excerpt: String = chunk.text.chars().take(160).collect();
        println!("    {}", excerpt.replace('\n', " "));
    }
    Ok(())
}

pub async fn run_reindex(app: &AppContext) -> Result<()> {
    let outcome = app.reindex().await;
    println!("{}", outcome.message);
    if !outcome.is_success() {
        bail!("reindex failed");
    }
    Ok(())
}

pub async fn run_status(app: &AppContext, config_path: &Path) -> Result<()> {
    app.rag().warm_up().await;
    let status = app.rag().index_status();
    let documents = app.documents().list().await?;
    let config = app.config();

    println!("config:         {}", config_path.display());
    println!("index dir:      {}", config.paths.index_dir.display());
    println!("indexed chunks: {}", status.chunks);
    println!("indexed files:  {}", status.sources);
    println!(
        "embedding:      {}",
        status.model.as_deref().unwrap_or(&config.embedding.provider)
    );
    println!("generation:     {}", config.generation.model);
    println!(
        "token:          {}",
        if config.generation.resolve_token().is_some() {
            "set"
        } else {
            "missing"
        }
    );
    println!("documents:      {}", documents.len());
    Ok(())
}

pub async fn run_documents_list(app: &AppContext) -> Result<()> {
    let docs = app.documents().list().await?;
    if docs.is_empty() {
        println!("No documents found in the database.");
        return Ok(());
    }

    for doc in docs {
        let date = chrono::DateTime::from_timestamp(doc.uploaded_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:>4}  {}  {}  ({})",
            doc.id,
            date,
            doc.title,
            doc.filename()
        );
    }
    Ok(())
}

pub async fn run_documents_add(
    app: &AppContext,
    title: &str,
    file: Option<&Path>,
    content: Option<&str>,
) -> Result<()> {
    let text = match (file, content) {
        (Some(path), None) => read_document_file(path)?,
        (None, Some(content)) => content.to_string(),
        _ => bail!("pass exactly one of --file or --content"),
    };

    let outcome = app.add_document(title, &text, "cli").await;
    println!("{}", outcome.message);
    if !outcome.is_success() {
        bail!("document was not added");
    }
    Ok(())
}

fn read_document_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(content_type_for_extension)
        .ok_or_else(|| anyhow::anyhow!("only .txt and .pdf files are supported"))?;
    Ok(extract_text(&bytes, content_type)?)
}

pub async fn run_documents_delete(app: &AppContext, id: i64) -> Result<()> {
    match app.delete_document(id).await? {
        Some(outcome) => {
            println!("{}", outcome.message);
            if !outcome.is_success() {
                bail!("index rebuild failed");
            }
            Ok(())
        }
        None => bail!("no document with id {}", id),
    }
}
