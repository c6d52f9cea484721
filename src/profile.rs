//! User profile store.
//!
//! One profile per installation, kept as pretty-printed JSON at
//! `<data_dir>/user_profile.json`. The pipeline only reads it.

use anyhow::{Context, Result};
use onboard_rag_core::models::UserProfile;
use std::path::{Path, PathBuf};

pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// `Ok(None)` when no profile has been created yet.
    pub fn load(&self) -> Result<Option<UserProfile>> {
        if !self.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read profile: {}", self.path.display()))?;
        let profile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse profile: {}", self.path.display()))?;
        Ok(Some(profile))
    }

    pub fn save(&self, profile: &UserProfile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(profile)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write profile: {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "profile saved");
        Ok(())
    }

    /// Remove the profile. Returns false if there was nothing to remove.
    pub fn delete(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .with_context(|| format!("Failed to delete profile: {}", self.path.display()))?;
        Ok(true)
    }
}
