//! Error kinds surfaced by the retrieval pipeline.
//!
//! Ingestion errors are per-document and never abort the rest of the corpus.
//! Query errors are per-request and never touch persisted state. Callers match
//! on the variant to tell "no documents" apart from an unreachable backend.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    /// The document folder is missing or contains no usable pages.
    #[error("no documents found in {folder}")]
    NoDocumentsFound { folder: String },

    /// Embedding or completion backend is unreachable or misbehaving.
    #[error("{provider} provider unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// A single document could not be ingested.
    #[error("failed to index {file}: {reason}")]
    IndexBuildFailure { file: String, reason: String },

    /// A completion stream ended before its terminal event.
    ///
    /// `partial` holds whatever text arrived, for optional display only.
    #[error("response stream interrupted: {reason}")]
    StreamInterrupted { reason: String, partial: String },

    #[error("invalid chunking parameters: size={size}, overlap={overlap} (need 0 <= overlap < size)")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no user profile exists yet")]
    MissingProfile,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RagError {
    pub fn unavailable(provider: impl Into<String>, reason: impl ToString) -> Self {
        RagError::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    /// Partial text carried by an interrupted stream, if any.
    pub fn partial_response(&self) -> Option<&str> {
        match self {
            RagError::StreamInterrupted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
