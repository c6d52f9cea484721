//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working offline setup: PDFs from `./docs`, hashing embeddings, and a local
//! Ollama chat model.
//!
//! ```toml
//! [docs]
//! folder = "./docs"
//! include_globs = ["**/*.pdf"]
//!
//! [chunking]
//! size = 1000
//! overlap = 200
//!
//! [retrieval]
//! mode = "rag"          # or "full_document"
//! top_k = 4
//! max_context_chars = 8000
//!
//! [embedding]
//! provider = "ollama"   # disabled | hash | ollama | openai | local
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [completion]
//! provider = "ollama"   # ollama | echo
//! model = "llama3.2:1b"
//!
//! [index]
//! dir = "./data/index"
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! default = "warn"
//! ```

use anyhow::{bail, Context, Result};
use onboard_rag_core::prompt::ContextMode;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_docs_folder")]
    pub folder: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            folder: default_docs_folder(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_docs_folder() -> PathBuf {
    PathBuf::from("./docs")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

/// Chunk window parameters, in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub mode: ContextMode,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Upper bound on rendered context characters; `0` disables the cap.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: ContextMode::default(),
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_max_context_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama or an OpenAI-compatible endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

pub const DEFAULT_HASH_DIMS: usize = 384;

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Connect timeout, and the longest gap allowed between streamed chunks.
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_completion_model(),
            url: None,
            temperature: None,
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_completion_provider() -> String {
    "ollama".to_string()
}
fn default_completion_model() -> String {
    "llama3.2:1b".to_string()
}
fn default_completion_timeout() -> u64 {
    120
}

/// Optional on-disk index snapshot. Without `dir`, every start re-embeds.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl StorageConfig {
    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("user_profile.json")
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.data_dir.join("transcript.json")
    }
}

/// Log levels: a default plus per-module overrides. `RUST_LOG` wins over both.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Load and validate the config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.size == 0 {
        bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.size ({})",
            config.chunking.overlap,
            config.chunking.size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.mode == ContextMode::Rag && !config.embedding.is_enabled() {
        bail!("retrieval.mode = \"rag\" requires an embedding provider (embedding.provider is 'disabled')");
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "local" => {}
        "hash" => {
            if embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'hash'");
            }
        }
        "ollama" | "openai" => {
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, ollama, openai, or local.",
            other
        ),
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate completion
    match config.completion.provider.as_str() {
        "ollama" | "echo" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be ollama or echo.",
            other
        ),
    }
    if config.completion.model.trim().is_empty() {
        bail!("completion.model must not be empty");
    }

    Ok(())
}
