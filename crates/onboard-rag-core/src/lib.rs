//! # Onboard RAG Core
//!
//! Pure retrieval logic for the onboarding assistant: data models, the
//! overlapping chunker, the embedding trait and vector helpers, the
//! in-memory vector index, grounded prompt assembly, and stream parsing.
//!
//! This crate contains no tokio runtime, filesystem I/O, or network code.
//! Providers, persistence, and the CLI live in the `onboard-rag` crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod prompt;
pub mod stream;

pub use error::{RagError, Result};
