//! Uploaded documents and search history.
//!
//! Documents added through the API or CLI are written as `.txt` files under
//! `<media_root>/documents/`, which is one of the indexed source roots, and
//! recorded in the `documents` table. The index itself is rebuilt by the
//! caller (see [`crate::context::AppContext`]).

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqlitePool};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::extract::MIME_TEXT;
use crate::migrate::run_migrations;
use crate::models::{SearchHistoryEntry, StoredDocument};

/// Longest `result_summary` kept per history row, in characters.
pub const MAX_SUMMARY_CHARS: usize = 5000;

pub struct DocumentStore {
    pool: SqlitePool,
    documents_dir: PathBuf,
}

impl DocumentStore {
    /// Opens the application database and runs migrations.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool, config.paths.documents_dir()))
    }

    pub fn new(pool: SqlitePool, documents_dir: PathBuf) -> Self {
        Self {
            pool,
            documents_dir,
        }
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Writes `content` to a new file named after `title` and records it.
    pub async fn add(&self, title: &str, content: &str, owner: &str) -> Result<StoredDocument> {
        if title.trim().is_empty() {
            bail!("title must not be empty");
        }
        if content.trim().is_empty() {
            bail!("content must not be empty");
        }

        std::fs::create_dir_all(&self.documents_dir)
            .with_context(|| format!("Failed to create {}", self.documents_dir.display()))?;
        let path = write_unique(&self.documents_dir, &sanitize_title(title), content)?;
        let file_path = path.to_string_lossy().to_string();
        let uploaded_at = chrono::Utc::now().timestamp();

        let inserted = sqlx::query(
            "INSERT INTO documents (title, file_path, content_type, uploaded_at, uploaded_by)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(&file_path)
        .bind(MIME_TEXT)
        .bind(uploaded_at)
        .bind(owner)
        .execute(&self.pool)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return Err(e.into());
            }
        };

        info!(id, title, path = %file_path, "document stored");
        Ok(StoredDocument {
            id,
            title: title.to_string(),
            file_path,
            content_type: MIME_TEXT.to_string(),
            uploaded_at,
            uploaded_by: owner.to_string(),
        })
    }

    /// All documents, newest first.
    pub async fn list(&self) -> Result<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "SELECT id, title, file_path, content_type, uploaded_at, uploaded_by
             FROM documents ORDER BY uploaded_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT id, title, file_path, content_type, uploaded_at, uploaded_by
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(document_from_row))
    }

    /// Removes the row and its file. Returns `false` if no such row.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let doc = match self.get(id).await? {
            Some(doc) => doc,
            None => return Ok(false),
        };

        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        match std::fs::remove_file(&doc.file_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(id, path = %doc.file_path, "document file already gone");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", doc.file_path));
            }
        }

        info!(id, title = %doc.title, "document deleted");
        Ok(true)
    }

    pub async fn record_search(&self, user: &str, query: &str, summary: &str) -> Result<()> {
        let summary: String = summary.chars().take(MAX_SUMMARY_CHARS).collect();
        sqlx::query(
            "INSERT INTO search_history (user, query, result_summary, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user)
        .bind(query)
        .bind(summary)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent searches, optionally for one user only.
    pub async fn recent_searches(
        &self,
        user: Option<&str>,
        limit: i64,
    ) -> Result<Vec<SearchHistoryEntry>> {
        let rows = match user {
            Some(user) => {
                sqlx::query(
                    "SELECT id, user, query, result_summary, created_at FROM search_history
                     WHERE user = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(user)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, user, query, result_summary, created_at FROM search_history
                     ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| SearchHistoryEntry {
                id: row.get("id"),
                user: row.get("user"),
                query: row.get("query"),
                result_summary: row.get("result_summary"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> StoredDocument {
    StoredDocument {
        id: row.get("id"),
        title: row.get("title"),
        file_path: row.get("file_path"),
        content_type: row.get("content_type"),
        uploaded_at: row.get("uploaded_at"),
        uploaded_by: row.get("uploaded_by"),
    }
}

/// Turns a free-form title into a safe file stem.
///
/// Keeps alphanumerics, spaces, `.` and `_`; trims trailing whitespace;
/// replaces spaces with `_`. Falls back to `document`.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_'))
        .collect();
    let stem = kept.trim_end().replace(' ', "_");
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem.to_string()
    }
}

/// Creates `<stem>.txt`, or `<stem>_<n>.txt` when taken.
fn write_unique(dir: &Path, stem: &str, content: &str) -> Result<PathBuf> {
    for n in 0u32.. {
        let name = if n == 0 {
            format!("{}.txt", stem)
        } else {
            format!("{}_{}.txt", stem, n)
        };
        let path = dir.join(name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(content.as_bytes())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()));
            }
        }
    }
    bail!("no free file name for {}", stem)
}
