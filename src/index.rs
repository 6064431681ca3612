//! In-memory vector index and its on-disk format.
//!
//! A [`VectorIndex`] holds every chunk of every source document together
//! with its embedding. Search is brute-force cosine similarity followed by
//! MMR re-ranking, which is fast enough for a corpus of resumes and job
//! descriptions.
//!
//! # Persistence
//!
//! The index is persisted as a single SQLite file, `index.sqlite`, inside
//! the configured index directory:
//!
//! ```text
//! meta(key TEXT PRIMARY KEY, value TEXT)          -- model, dims, built_at
//! chunks(id INTEGER PRIMARY KEY, position INTEGER, source TEXT,
//!        text TEXT, hash TEXT, embedding BLOB)
//! ```
//!
//! [`write_index`] always writes into a sibling staging directory and
//! renames it into place once the database is complete and closed, so the
//! index directory is either absent or holds a finished index.
//!
//! [`open_index`] reads everything into memory and closes the connection
//! before returning. A loaded index holds no file handles, so the directory
//! can be deleted while readers still use the in-memory copy.

use anyhow::{bail, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::mmr::mmr_select;
use crate::models::RetrievedChunk;

/// File name of the persisted index inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite";

/// One embedded chunk.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub source: String,
    pub position: i64,
    pub text: String,
    pub hash: String,
    pub vector: Vec<f32>,
}

/// Immutable snapshot of the indexed corpus.
#[derive(Debug)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(model: impl Into<String>, dims: usize, entries: Vec<IndexEntry>) -> Self {
        Self {
            model: model.into(),
            dims,
            entries,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of distinct source documents in the index.
    pub fn source_count(&self) -> usize {
        let mut sources: Vec<&str> = self.entries.iter().map(|e| e.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        sources.len()
    }

    /// Similarity search with MMR re-ranking.
    ///
    /// Takes the `fetch_k` chunks most similar to `query_vec`, then selects
    /// `k` of them by MMR with trade-off `lambda`. Results are ordered by
    /// selection, best first.
    pub fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Vec<RetrievedChunk> {
        if self.entries.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query_vec, &e.vector)))
            .collect();
        // Stable sort keeps index order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(fetch_k.max(k));

        let candidate_vecs: Vec<&[f32]> = scored
            .iter()
            .map(|(i, _)| self.entries[*i].vector.as_slice())
            .collect();

        mmr_select(query_vec, &candidate_vecs, k, lambda)
            .into_iter()
            .map(|pick| {
                let (entry_idx, score) = scored[pick];
                let entry = &self.entries[entry_idx];
                RetrievedChunk {
                    source: entry.source.clone(),
                    position: entry.position,
                    text: entry.text.clone(),
                    score,
                }
            })
            .collect()
    }
}

/// Whether `dir` holds something that should be opened as an index.
///
/// Presence and non-emptiness signal "index exists"; anything else means a
/// rebuild is needed.
pub fn index_exists(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Sibling directory used while an index is being written.
pub fn staging_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    dir.with_file_name(format!("{}.staging", name))
}

/// Remove a persisted index directory and any leftover staging directory.
pub fn remove_index(dir: &Path) -> Result<()> {
    for path in [dir.to_path_buf(), staging_dir(dir)] {
        if path.exists() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove index directory {}", path.display()))?;
        }
    }
    Ok(())
}

async fn connect(path: &Path, read_only: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(!read_only)
        .read_only(read_only)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Persist `index` to `dir`, replacing whatever was there.
pub async fn write_index(dir: &Path, index: &VectorIndex) -> Result<()> {
    let staging = staging_dir(dir);
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)
        .with_context(|| format!("Failed to create {}", staging.display()))?;

    let pool = connect(&staging.join(INDEX_FILE), false).await?;
    let written = write_tables(&pool, index).await;
    pool.close().await;
    written?;

    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove old index {}", dir.display()))?;
    }
    std::fs::rename(&staging, dir)
        .with_context(|| format!("Failed to move index into {}", dir.display()))?;

    Ok(())
}

async fn write_tables(pool: &SqlitePool, index: &VectorIndex) -> Result<()> {
    sqlx::query("CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
        .execute(pool)
        .await?;
    sqlx::query(
        r#"
        CREATE TABLE chunks (
            id INTEGER PRIMARY KEY,
            position INTEGER NOT NULL,
            source TEXT NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut tx = pool.begin().await?;

    let meta = [
        ("model", index.model.clone()),
        ("dims", index.dims.to_string()),
        ("built_at", chrono::Utc::now().timestamp().to_string()),
    ];
    for (key, value) in meta {
        sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    for entry in &index.entries {
        sqlx::query(
            "INSERT INTO chunks (position, source, text, hash, embedding) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.position)
        .bind(&entry.source)
        .bind(&entry.text)
        .bind(&entry.hash)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Load a persisted index fully into memory.
///
/// Fails when the file is missing, unreadable, or internally inconsistent
/// (missing metadata, vectors of the wrong dimension).
pub async fn open_index(dir: &Path) -> Result<VectorIndex> {
    let path = dir.join(INDEX_FILE);
    if !path.is_file() {
        bail!("No index file at {}", path.display());
    }

    let pool = connect(&path, true).await?;
    let loaded = read_tables(&pool).await;
    pool.close().await;
    loaded
}

async fn read_tables(pool: &SqlitePool) -> Result<VectorIndex> {
    let meta: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM meta")
        .fetch_all(pool)
        .await?;
    let lookup = |key: &str| {
        meta.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| anyhow::anyhow!("Index metadata missing '{}'", key))
    };
    let model = lookup("model")?;
    let dims: usize = lookup("dims")?
        .parse()
        .context("Index metadata 'dims' is not a number")?;

    let rows: Vec<(i64, String, String, String, Vec<u8>)> = sqlx::query_as(
        "SELECT position, source, text, hash, embedding FROM chunks ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for (position, source, text, hash, blob) in rows {
        let vector = blob_to_vec(&blob);
        if vector.len() != dims {
            bail!(
                "Corrupt index: chunk {}#{} has {} dims, expected {}",
                source,
                position,
                vector.len(),
                dims
            );
        }
        entries.push(IndexEntry {
            source,
            position,
            text,
            hash,
            vector,
        });
    }

    Ok(VectorIndex::new(model, dims, entries))
}
