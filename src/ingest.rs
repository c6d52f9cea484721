//! Index build pipeline.
//!
//! Coordinates the build phase: loader → chunker → embedding → vector index,
//! with an optional detour through the on-disk snapshot. The result is a
//! [`KnowledgeBase`], published through an [`IndexHandle`] so a rebuild
//! swaps in a complete new snapshot or leaves the old one untouched.

use onboard_rag_core::chunk::chunk_pages;
use onboard_rag_core::embedding::EmbeddingProvider;
use onboard_rag_core::index::{IndexEntry, VectorIndex};
use onboard_rag_core::prompt::ContextBlock;
use onboard_rag_core::RagError;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::Config;
use crate::embedding::embed_in_batches;
use crate::index_store::{self, FingerprintInput, IndexStore};
use crate::loader::{self, LoadedDocument};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};

/// An immutable, fully built index plus the documents it came from.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    pub index: VectorIndex,
    pub documents: Vec<LoadedDocument>,
}

impl KnowledgeBase {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty()
    }

    /// Whole-document context blocks, in file order.
    pub fn full_document_blocks(&self) -> Vec<ContextBlock> {
        loader::full_document_blocks(&self.documents)
    }
}

/// Summary of one build.
#[derive(Debug)]
pub struct BuildReport {
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    /// Files that were skipped, as [`RagError::IndexBuildFailure`]s.
    pub failures: Vec<RagError>,
    pub reused_snapshot: bool,
    pub model: String,
    pub elapsed_ms: u128,
}

/// Run the full build phase.
///
/// Per-file problems are collected in the report and never abort the build.
/// Embedding failures do abort it: a half-embedded index is never returned.
pub async fn build_knowledge_base(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    progress: &dyn IngestProgressReporter,
) -> Result<(KnowledgeBase, BuildReport), RagError> {
    let started = Instant::now();
    progress.report(IngestProgressEvent::Loading {
        folder: config.docs.folder.display().to_string(),
    });

    let load = loader::load_documents(&config.docs.folder, &config.docs.include_globs)?;
    let chunks = chunk_pages(&load.pages(), config.chunking.size, config.chunking.overlap)?;

    progress.report(IngestProgressEvent::Loaded {
        documents: load.documents.len() as u64,
        pages: load.page_count() as u64,
        chunks: chunks.len() as u64,
        skipped: load.failures.len() as u64,
    });
    if let Err(e) = load.require_documents() {
        tracing::warn!("{}; answers will fall back to the refusal path", e);
    }

    let mut reused_snapshot = false;
    let entries = if chunks.is_empty() || !config.embedding.is_enabled() {
        Vec::new()
    } else {
        let fp = index_store::fingerprint(&FingerprintInput {
            model: provider.model_name(),
            dims: provider.dims(),
            chunk_size: config.chunking.size,
            chunk_overlap: config.chunking.overlap,
            documents: &load.documents,
        });

        match load_snapshot(config, &fp).await {
            Some(entries) if entries.len() == chunks.len() => {
                reused_snapshot = true;
                progress.report(IngestProgressEvent::SnapshotReused {
                    chunks: entries.len() as u64,
                });
                tracing::info!(chunks = entries.len(), "reusing index snapshot");
                entries
            }
            _ => {
                let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
                let total = texts.len() as u64;
                let vectors = embed_in_batches(provider, &texts, config.embedding.batch_size, |n| {
                    progress.report(IngestProgressEvent::Embedding {
                        n: n as u64,
                        total,
                    })
                })
                .await?;

                let entries: Vec<IndexEntry> = vectors
                    .into_iter()
                    .zip(chunks.iter().cloned())
                    .map(|(v, c)| IndexEntry::new(v, c))
                    .collect();
                save_snapshot(config, &fp, provider.model_name(), &entries).await;
                entries
            }
        }
    };

    let index = VectorIndex::from_entries(entries)?;
    let report = BuildReport {
        documents: load.documents.len(),
        pages: load.page_count(),
        chunks: chunks.len(),
        failures: load.failures,
        reused_snapshot,
        model: provider.model_name().to_string(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    tracing::info!(
        documents = report.documents,
        chunks = report.chunks,
        skipped = report.failures.len(),
        reused_snapshot,
        elapsed_ms = report.elapsed_ms as u64,
        "index built"
    );

    Ok((
        KnowledgeBase {
            index,
            documents: load.documents,
        },
        report,
    ))
}

/// Snapshot problems only cost a re-embed, so they are logged, not returned.
async fn load_snapshot(config: &Config, fingerprint: &str) -> Option<Vec<IndexEntry>> {
    let dir = config.index.dir.as_ref()?;
    let store = match IndexStore::open(dir).await {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(error = %e, "cannot open index snapshot, rebuilding");
            return None;
        }
    };
    let loaded = store.load(fingerprint).await;
    store.close().await;
    match loaded {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "index snapshot unreadable, rebuilding");
            None
        }
    }
}

async fn save_snapshot(config: &Config, fingerprint: &str, model: &str, entries: &[IndexEntry]) {
    let Some(dir) = config.index.dir.as_ref() else {
        return;
    };
    let result = async {
        let store = IndexStore::open(dir).await?;
        let saved = store.save(fingerprint, model, entries).await;
        store.close().await;
        saved
    }
    .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to save index snapshot");
    }
}

// ============ Index handle ============

/// Shared access to the current [`KnowledgeBase`].
///
/// Readers clone an `Arc` and keep using it even while a rebuild runs. At
/// most one build is in flight; a failed build leaves the current snapshot
/// in place.
pub struct IndexHandle {
    current: RwLock<Arc<KnowledgeBase>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHandle {
    /// A handle holding the explicit empty index.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(KnowledgeBase::empty())),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<KnowledgeBase> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub async fn rebuild(
        &self,
        config: &Config,
        provider: &dyn EmbeddingProvider,
        progress: &dyn IngestProgressReporter,
    ) -> Result<BuildReport, RagError> {
        let _build = self.build_lock.lock().await;
        let (kb, report) = build_knowledge_base(config, provider, progress).await?;
        self.publish(kb);
        Ok(report)
    }

    fn publish(&self, kb: KnowledgeBase) {
        let kb = Arc::new(kb);
        match self.current.write() {
            Ok(mut guard) => *guard = kb,
            Err(poisoned) => *poisoned.into_inner() = kb,
        }
    }
}
