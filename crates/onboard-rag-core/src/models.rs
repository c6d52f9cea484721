//! Core data models used throughout the onboarding assistant.
//!
//! These types represent the pages, chunks, profile, and chat turns that flow
//! through the ingestion, retrieval, and answering pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Plain text extracted from one physical page of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// File name of the owning document (relative to the docs folder).
    pub source: String,
    /// Zero-based page index within the document.
    pub page: usize,
    pub text: String,
}

impl Page {
    pub fn new(source: impl Into<String>, page: usize, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page,
            text: text.into(),
        }
    }
}

/// A contiguous text window derived from one page.
///
/// `position` is global across a chunking run and is the traceability key
/// used for stable tie-breaking in the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub page: usize,
    /// Zero-based sequence position across all chunks of a build.
    pub position: usize,
    /// Zero-based index within the originating page.
    pub index_in_page: usize,
}

/// A chunk returned from similarity search together with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Department choices offered when creating a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Department {
    Engineering,
    #[serde(rename = "HR")]
    Hr,
    Sales,
    Other,
}

impl Department {
    pub const ALL: [Department; 4] = [
        Department::Engineering,
        Department::Hr,
        Department::Sales,
        Department::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Engineering => "Engineering",
            Department::Hr => "HR",
            Department::Sales => "Sales",
            Department::Other => "Other",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Department::ALL
            .iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| {
                format!(
                    "unknown department '{}'. Must be one of: Engineering, HR, Sales, Other",
                    s
                )
            })
    }
}

/// The single user profile of an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub department: Department,
    /// Job title, free text (e.g. "Junior Software Engineer").
    pub role: String,
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => f.write_str("user"),
            ChatRole::Assistant => f.write_str("assistant"),
        }
    }
}

/// One completed message in the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}
