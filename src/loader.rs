//! Document loader.
//!
//! Walks the docs folder, keeps files matching the include globs, extracts
//! per-page text, and returns everything in lexical path order. A file that
//! cannot be read or parsed is recorded as a failure and skipped; the rest of
//! the corpus still loads. A missing or empty folder is not an error.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use onboard_rag_core::models::Page;
use onboard_rag_core::prompt::ContextBlock;
use onboard_rag_core::RagError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::extract;

/// One source file and its non-blank pages.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Path relative to the docs folder, `/`-separated.
    pub name: String,
    pub pages: Vec<Page>,
    /// Hex SHA-256 of the raw file bytes.
    pub sha256: String,
}

impl LoadedDocument {
    /// All page text joined with blank lines.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug)]
pub struct LoadReport {
    pub folder: PathBuf,
    pub documents: Vec<LoadedDocument>,
    /// One [`RagError::IndexBuildFailure`] per skipped file.
    pub failures: Vec<RagError>,
}

impl LoadReport {
    /// True when no document contributed any page.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.documents.iter().map(|d| d.pages.len()).sum()
    }

    /// Every page of every document, in load order.
    pub fn pages(&self) -> Vec<Page> {
        self.documents
            .iter()
            .flat_map(|d| d.pages.iter().cloned())
            .collect()
    }

    /// Error out with [`RagError::NoDocumentsFound`] when nothing loaded.
    pub fn require_documents(&self) -> Result<(), RagError> {
        if self.is_empty() {
            return Err(RagError::NoDocumentsFound {
                folder: self.folder.display().to_string(),
            });
        }
        Ok(())
    }
}

/// One context block per document, for full-document prompting.
pub fn full_document_blocks(documents: &[LoadedDocument]) -> Vec<ContextBlock> {
    documents
        .iter()
        .map(|d| ContextBlock::new(d.name.clone(), d.full_text()))
        .collect()
}

pub fn load_documents(folder: &Path, include_globs: &[String]) -> Result<LoadReport> {
    let mut report = LoadReport {
        folder: folder.to_path_buf(),
        documents: Vec::new(),
        failures: Vec::new(),
    };

    if !folder.is_dir() {
        tracing::warn!(folder = %folder.display(), "docs folder does not exist");
        return Ok(report);
    }

    let include_set = build_globset(include_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(folder) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(folder).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path) in files {
        match load_file(&name, &path) {
            Ok(doc) if doc.pages.is_empty() => {
                tracing::warn!(file = %name, "no extractable text, skipping");
                report.failures.push(RagError::IndexBuildFailure {
                    file: name,
                    reason: "no extractable text".to_string(),
                });
            }
            Ok(doc) => {
                tracing::debug!(file = %name, pages = doc.pages.len(), "loaded document");
                report.documents.push(doc);
            }
            Err(reason) => {
                tracing::warn!(file = %name, %reason, "failed to load document, skipping");
                report
                    .failures
                    .push(RagError::IndexBuildFailure { file: name, reason });
            }
        }
    }

    Ok(report)
}

fn load_file(name: &str, path: &Path) -> Result<LoadedDocument, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    let texts = extract::extract_pages(path, &bytes).map_err(|e| e.to_string())?;

    let pages = texts
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Page::new(name, i, text))
        .collect();

    Ok(LoadedDocument {
        name: name.to_string(),
        pages,
        sha256,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
