//! # Onboard RAG
//!
//! A local onboarding assistant. It reads a company's onboarding PDFs,
//! indexes them with embeddings, and answers a new hire's questions with a
//! language model that is told to answer only from the retrieved text, cite
//! the source file, and refuse with a fixed sentence otherwise.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ docs/*.pdf  │──▶│ Chunk+Embed │──▶│ Vector index │
//! │  (loader)   │   │  (ingest)   │   │  (+snapshot) │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ top-k
//!                   ┌─────────────┐   ┌──────▼───────┐
//!   question ──────▶│   Session   │──▶│    Prompt    │──▶ model ──▶ answer
//!                   └─────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`extract`] | PDF and plain-text page extraction |
//! | [`loader`] | Docs folder scanning |
//! | [`embedding`] | Embedding providers |
//! | [`completion`] | Completion clients and streams |
//! | [`index_store`] | On-disk index snapshot |
//! | [`ingest`] | Index build pipeline |
//! | [`session`] | Query-time operations |
//! | [`profile`] / [`transcript`] | User profile and chat history stores |
//! | [`commands`] | `onboard` subcommands |
//!
//! Pure logic (chunking, vector index, prompt assembly, stream parsing)
//! lives in the `onboard-rag-core` crate.

pub mod commands;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index_store;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod profile;
pub mod progress;
pub mod session;
pub mod transcript;
