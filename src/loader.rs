//! Document loader: walks the configured source directories.
//!
//! Every `.txt` and `.pdf` file found recursively under each root is read
//! and converted to text. Missing roots are skipped silently; unreadable or
//! unextractable files are skipped with a warning. The load as a whole
//! never fails.

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::extract::{content_type_for_extension, extract_text};
use crate::models::LoadedDocument;

/// Matched case-insensitively.
const INCLUDE_GLOBS: &[&str] = &["**/*.txt", "**/*.pdf"];

/// Load every indexable document under `roots`.
///
/// Results are sorted by source path for deterministic index contents.
/// Returns an empty vec when nothing is found.
pub fn load_documents(roots: &[PathBuf]) -> Vec<LoadedDocument> {
    let include_set = match build_globset(INCLUDE_GLOBS) {
        Ok(set) => set,
        Err(e) => {
            warn!(error = %e, "invalid include globs; loading nothing");
            return Vec::new();
        }
    };

    let mut docs = Vec::new();
    for root in roots {
        if !root.exists() {
            debug!(root = %root.display(), "source directory absent, skipping");
            continue;
        }
        docs.extend(load_root(root, &include_set));
    }

    docs.sort_by(|a, b| a.source.cmp(&b.source));
    docs
}

fn load_root(root: &Path, include_set: &GlobSet) -> Vec<LoadedDocument> {
    let mut docs = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "cannot read directory entry, skipping");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !include_set.is_match(relative) {
            continue;
        }

        match load_file(path) {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => {
                debug!(path = %path.display(), "file has no text, skipping");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot load file, skipping");
            }
        }
    }

    docs
}

/// Read one file. `Ok(None)` means the file yielded no text.
fn load_file(path: &Path) -> Result<Option<LoadedDocument>> {
    let content_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(content_type_for_extension)
        .ok_or_else(|| anyhow::anyhow!("unsupported file extension"))?;

    let bytes = std::fs::read(path)?;
    let text = extract_text(&bytes, content_type)?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(LoadedDocument {
        source: path.to_string_lossy().to_string(),
        content_type: content_type.to_string(),
        text,
    }))
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
