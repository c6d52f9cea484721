//! Brute-force in-memory vector index.
//!
//! Holds `(vector, chunk)` entries and answers nearest-neighbour queries by
//! cosine similarity over every stored vector. Onboarding corpora are a few
//! hundred chunks, so an exact scan is both fast enough and deterministic.

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

/// One stored vector together with the chunk it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

impl IndexEntry {
    pub fn new(vector: Vec<f32>, chunk: Chunk) -> Self {
        Self { vector, chunk }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dims: usize,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh index from `entries`.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self> {
        let mut index = Self::new();
        index.build(entries)?;
        Ok(index)
    }

    /// Replace the index contents with `entries`.
    ///
    /// All vectors must share one dimension. On error the previous contents
    /// are left untouched.
    pub fn build(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        let dims = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                actual: bad.vector.len(),
            });
        }
        self.entries = entries;
        self.dims = dims;
        Ok(())
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order. An empty index or `k == 0` yields
    /// an empty result.
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        // sort_by is stable, so ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension of the stored entries; `0` while empty.
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Iterate chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}
