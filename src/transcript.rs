//! Chat transcript stores.
//!
//! The transcript is an append-only list of completed turns. The session
//! only appends after a response has fully arrived, so an interrupted
//! answer never shows up here.

use anyhow::{Context, Result};
use onboard_rag_core::models::ChatTurn;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait TranscriptStore: Send + Sync {
    fn load(&self) -> Result<Vec<ChatTurn>>;

    /// Append turns in order. Either all of them are stored or none.
    fn append(&self, turns: &[ChatTurn]) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// JSON array on disk, rewritten through a temp file on every append.
pub struct JsonTranscriptStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonTranscriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<ChatTurn>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read transcript: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse transcript: {}", self.path.display()))
    }

    fn write(&self, turns: &[ChatTurn]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(turns)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write transcript: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace transcript: {}", self.path.display()))?;
        Ok(())
    }
}

impl TranscriptStore for JsonTranscriptStore {
    fn load(&self) -> Result<Vec<ChatTurn>> {
        self.read()
    }

    fn append(&self, turns: &[ChatTurn]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = self.read()?;
        all.extend_from_slice(turns);
        self.write(&all)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.path.is_file() {
            std::fs::remove_file(&self.path).with_context(|| {
                format!("Failed to delete transcript: {}", self.path.display())
            })?;
        }
        Ok(())
    }
}

/// In-process transcript, for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    turns: Mutex<Vec<ChatTurn>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranscriptStore for MemoryTranscriptStore {
    fn load(&self) -> Result<Vec<ChatTurn>> {
        Ok(self.turns.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn append(&self, turns: &[ChatTurn]) -> Result<()> {
        self.turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(turns);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.turns.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}
