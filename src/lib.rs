//! # Job Finder RAG
//!
//! Retrieval-augmented question answering over job descriptions and
//! resumes.
//!
//! Text and PDF files from the configured source directories are chunked,
//! embedded, and stored in a local vector index. A question is answered by
//! retrieving the most relevant chunks (similarity search with MMR
//! re-ranking) and sending them with the question to a hosted
//! text-generation model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ media/docs  │──▶│  Loader +   │──▶│ Vector index │
//! │ data/       │   │ Chunk+Embed │   │ index.sqlite │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ retrieve (MMR)
//!                                            ▼
//!                   ┌─────────────┐   ┌──────────────┐
//!                   │ Generation  │◀──│ RAG service  │
//!                   │ (HF Hub)    │   └──────┬───────┘
//!                   └─────────────┘          │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌───────────┐
//!                   │   CLI    │       │ HTTP/MCP  │
//!                   │ (jobrag) │       │  (axum)   │
//!                   └──────────┘       └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from `.txt` / `.pdf` |
//! | [`loader`] | Source directory walking |
//! | [`chunk`] | Overlapping character chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`mmr`] | Maximal Marginal Relevance re-ranking |
//! | [`index`] | In-memory vector index and its SQLite file |
//! | [`vector_store`] | Index lifecycle: load, rebuild, reload |
//! | [`generation`] | Hosted text-generation client with retries |
//! | [`rag`] | Search orchestration and prompt building |
//! | [`documents`] | Uploaded documents and search history |
//! | [`context`] | Shared application state |
//! | [`traits`] | Tool trait and registry |
//! | [`mcp`] | MCP bridge |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI subcommands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod index;
pub mod loader;
pub mod logging;
pub mod mcp;
pub mod migrate;
pub mod mmr;
pub mod models;
pub mod rag;
pub mod server;
pub mod traits;
pub mod vector_store;
