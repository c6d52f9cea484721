//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the offline [`HashEmbedder`], and pure helpers for vector
//! serialization and similarity.
//!
//! Network-backed providers (Ollama, OpenAI, fastembed) live in the
//! `onboard-rag` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// Trait for embedding providers.
///
/// `embed_batch` must be semantically equivalent to calling [`embed`]
/// once per text; batching only affects throughput. Implementations report
/// an unreachable backend as [`RagError::ProviderUnavailable`].
///
/// [`embed`]: EmbeddingProvider::embed
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per text in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::unavailable(self.model_name(), "empty embedding response"))
    }
}

/// Check that every vector has the provider's declared dimension.
pub fn check_dims(vectors: &[Vec<f32>], expected: usize) -> Result<()> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(v) => Err(RagError::DimensionMismatch {
            expected,
            actual: v.len(),
        }),
        None => Ok(()),
    }
}

// ============ Hash Embedder ============

/// Deterministic, offline embedder based on signed feature hashing.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into one of
/// `dims` buckets with a ±1 sign; the result is L2-normalized. Texts that
/// share vocabulary land close together under cosine similarity. Identical
/// input always produces bit-identical output.
pub struct HashEmbedder {
    dims: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            model: format!("hash-{}", dims),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = digest[..8]
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            let idx = (bucket % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vec[idx] += sign;
        }
        l2_normalize(&mut vec);
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use onboard_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_hash_embedder_is_deterministic_and_unit_length() {
        let e = HashEmbedder::new(64);
        let a = e.embed_text("Vacation policy is 20 days.");
        let b = e.embed_text("Vacation policy is 20 days.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_ranks_shared_vocabulary_higher() {
        let e = HashEmbedder::new(256);
        let query = e.embed_text("How many vacation days?");
        let handbook = e.embed_text("The vacation policy is 20 days per year.");
        let benefits = e.embed_text("Health insurance starts on your first month.");
        assert!(cosine_similarity(&query, &handbook) > cosine_similarity(&query, &benefits));
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero_vector() {
        let e = HashEmbedder::new(8);
        assert!(e.embed_text("  ... ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let e = HashEmbedder::new(32);
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];
        let batch = e.embed_batch(&texts).await.unwrap();
        for (t, v) in texts.iter().zip(batch.iter()) {
            assert_eq!(&e.embed(t).await.unwrap(), v);
        }
        assert_eq!(e.model_name(), "hash-32");
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(&[vec![0.0; 3], vec![1.0; 3]], 3).is_ok());
        assert!(matches!(
            check_dims(&[vec![0.0; 3], vec![1.0; 2]], 3),
            Err(RagError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
