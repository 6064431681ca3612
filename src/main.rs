//! # Job Finder RAG CLI (`jobrag`)
//!
//! ## Usage
//!
//! ```bash
//! jobrag --config ./config/jobrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jobrag init` | Create data directories and the application database |
//! | `jobrag serve` | Start the HTTP API and MCP endpoint |
//! | `jobrag search "<query>"` | Ask a question; prints the answer and sources |
//! | `jobrag retrieve "<query>"` | Show the chunks a question would retrieve |
//! | `jobrag reindex` | Delete and rebuild the vector index |
//! | `jobrag documents list\|add\|delete` | Manage uploaded documents |
//! | `jobrag status` | Index and configuration summary |
//!
//! ## Examples
//!
//! ```bash
//! jobrag init
//! jobrag documents add --title "Senior Python Developer" --file ./jd/python.txt
//! jobrag retrieve "django experience" --k 3
//! HUGGING_FACE_HUB_TOKEN=hf_... jobrag search "Which roles fit a data engineer?"
//! jobrag serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use job_finder_rag::commands;
use job_finder_rag::config;
use job_finder_rag::context::AppContext;
use job_finder_rag::logging::init_logging;
use job_finder_rag::server;

/// Job Finder RAG: answers questions about job descriptions and resumes
/// from a local vector index.
#[derive(Parser)]
#[command(
    name = "jobrag",
    about = "Job Finder RAG: retrieval-augmented job and resume matching",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/jobrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create data directories and the application database.
    ///
    /// Idempotent.
    Init,

    /// Start the HTTP API (including `/mcp`).
    ///
    /// Opens or builds the index before accepting requests.
    Serve,

    /// Answer a question from the indexed documents.
    Search {
        query: String,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve matching chunks without calling the generation endpoint.
    Retrieve {
        query: String,

        /// Number of chunks to return (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Delete and rebuild the vector index from all source directories.
    Reindex,

    /// Manage uploaded documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Show index and configuration status.
    Status,
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// List stored documents, newest first.
    List,

    /// Store a document and re-index.
    Add {
        #[arg(long)]
        title: String,

        /// Read content from a `.txt` or `.pdf` file.
        #[arg(long, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// Inline content.
        #[arg(long)]
        content: Option<String>,
    },

    /// Delete a document by id and re-index.
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging);

    if let Commands::Init = cli.command {
        return commands::run_init(&cfg).await;
    }

    let app = Arc::new(AppContext::from_config(cfg).await?);

    match cli.command {
        Commands::Init => {}
        Commands::Serve => {
            app.rag().warm_up().await;
            server::run_server(app.clone()).await?;
        }
        Commands::Search { query, json } => {
            commands::run_search(&app, &query, json).await?;
        }
        Commands::Retrieve { query, k } => {
            commands::run_retrieve(&app, &query, k).await?;
        }
        Commands::Reindex => {
            commands::run_reindex(&app).await?;
        }
        Commands::Documents { action } => match action {
            DocumentsAction::List => {
                commands::run_documents_list(&app).await?;
            }
            DocumentsAction::Add {
                title,
                file,
                content,
            } => {
                commands::run_documents_add(&app, &title, file.as_deref(), content.as_deref())
                    .await?;
            }
            DocumentsAction::Delete { id } => {
                commands::run_documents_delete(&app, id).await?;
            }
        },
        Commands::Status => {
            commands::run_status(&app, &cli.config).await?;
        }
    }

    app.documents().close().await;
    Ok(())
}
