//! TOML configuration parsing and validation.
//!
//! All settings live in a single file (default `./config/jobrag.toml`).
//! Every section is optional; omitted keys fall back to the defaults below.
//! Relative paths are resolved against the directory containing the config
//! file, so a config can be moved together with its data.
//!
//! ```toml
//! [paths]
//! index_dir = "../vector_db"
//! media_root = "../media"
//! source_dirs = ["../media/documents", "../data"]
//! db = "../db/jobrag.sqlite"
//!
//! [chunking]
//! chunk_size = 800
//! overlap = 150
//!
//! [retrieval]
//! k = 5
//! fetch_k = 20
//!
//! [embedding]
//! provider = "local"
//!
//! [generation]
//! model = "mistralai/Mistral-7B-Instruct-v0.3"
//! token_env = ["HUGGING_FACE_HUB_TOKEN", "hugging_api"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding the persisted vector index.
    pub index_dir: PathBuf,
    /// Root for uploaded files; documents land in `<media_root>/documents`.
    pub media_root: PathBuf,
    /// Directories scanned recursively for `.txt` and `.pdf` files.
    pub source_dirs: Vec<PathBuf>,
    /// SQLite database for document records and search history.
    pub db: PathBuf,
}

impl PathsConfig {
    /// Directory where uploaded and tool-created documents are written.
    pub fn documents_dir(&self) -> PathBuf {
        self.media_root.join("documents")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// MMR trade-off: 1.0 = pure relevance, 0.0 = pure diversity.
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    /// Characters of chunk text kept in each source citation.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            fetch_k: default_fetch_k(),
            mmr_lambda: default_mmr_lambda(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_fetch_k() -> usize {
    20
}
fn default_mmr_lambda() -> f32 {
    0.5
}
fn default_excerpt_chars() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Base URL; the model id is appended as a path segment.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Environment variables checked in order for the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: Vec<String>,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_warmup_delay_secs")]
    pub warmup_delay_secs: u64,
    #[serde(default = "default_connect_backoff_secs")]
    pub connect_backoff_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_generation_model(),
            token_env: default_token_env(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            warmup_delay_secs: default_warmup_delay_secs(),
            connect_backoff_secs: default_connect_backoff_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}
fn default_generation_model() -> String {
    "mistralai/Mistral-7B-Instruct-v0.3".to_string()
}
fn default_token_env() -> Vec<String> {
    vec![
        "HUGGING_FACE_HUB_TOKEN".to_string(),
        "hugging_api".to_string(),
    ]
}
fn default_max_new_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_attempts() -> u32 {
    3
}
fn default_warmup_delay_secs() -> u64 {
    15
}
fn default_connect_backoff_secs() -> u64 {
    5
}

impl GenerationConfig {
    /// Returns the first non-empty token found in `token_env`.
    pub fn resolve_token(&self) -> Option<String> {
        self.token_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Pause between dropping the live index and deleting its directory.
    #[serde(default = "default_release_delay_ms")]
    pub release_delay_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            release_delay_ms: default_release_delay_ms(),
        }
    }
}

fn default_release_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    /// Environment variable holding the bearer token for protected routes.
    /// Protection is off when unset or when the variable is empty.
    #[serde(default)]
    pub auth_token_env: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_query_chars: default_max_query_chars(),
            auth_token_env: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_query_chars() -> usize {
    1000
}

impl ServerConfig {
    pub fn resolve_auth_token(&self) -> Option<String> {
        self.auth_token_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Builds a config with every path placed under `root` and all other
    /// settings at their defaults.
    pub fn with_root(root: &Path) -> Self {
        let media_root = root.join("media");
        Self {
            paths: PathsConfig {
                index_dir: root.join("vector_db"),
                source_dirs: vec![media_root.join("documents"), root.join("data")],
                media_root,
                db: root.join("db").join("jobrag.sqlite"),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            index: IndexConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
        }

        if self.retrieval.k < 1 {
            anyhow::bail!("retrieval.k must be >= 1");
        }
        if self.retrieval.fetch_k < self.retrieval.k {
            anyhow::bail!("retrieval.fetch_k must be >= retrieval.k");
        }
        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            anyhow::bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
        }

        if self.paths.source_dirs.is_empty() {
            anyhow::bail!("paths.source_dirs must list at least one directory");
        }

        match self.embedding.provider.as_str() {
            "local" | "ollama" | "hash" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be local, ollama, or hash.",
                other
            ),
        }
        if self.embedding.provider == "ollama" && self.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified when provider is 'ollama'");
        }
        if self.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        if self.generation.max_attempts < 1 {
            anyhow::bail!("generation.max_attempts must be >= 1");
        }
        if self.generation.token_env.is_empty() {
            anyhow::bail!("generation.token_env must name at least one variable");
        }

        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.paths.index_dir);
        resolve(&mut self.paths.media_root);
        resolve(&mut self.paths.db);
        for dir in &mut self.paths.source_dirs {
            resolve(dir);
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_relative_to(base);
    config.validate()?;

    Ok(config)
}
