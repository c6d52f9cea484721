//! Grounded prompt assembly.
//!
//! [`PromptBuilder`] turns a user profile, a ranked list of context blocks,
//! and the user's question into a [`Prompt`]: a fixed system instruction that
//! carries the grounding policy, plus a user message with the profile,
//! labelled context, and the literal question.
//!
//! ```text
//! system:  policy (answer from context, cite [SOURCE: file], else refuse)
//! user:    profile lines
//!          Context: [SOURCE: a.pdf] ... [SOURCE: b.pdf] ...
//!          Question: <question>
//! ```
//!
//! The policy is advisory to the model; the builder only guarantees that the
//! instruction and context are present and formatted deterministically.

use serde::{Deserialize, Serialize};

use crate::models::{ScoredChunk, UserProfile};

/// Sentence the model must use when the context does not contain the answer.
pub const REFUSAL_SENTENCE: &str =
    "I could not find this in the onboarding documents. Please ask the HR manager.";

/// Placeholder placed in the context section when there is nothing to ground on.
pub const EMPTY_CONTEXT_PLACEHOLDER: &str = "(no onboarding documents are available)";

const POLICY: &str = "You are a helpful onboarding assistant for new employees.
Follow these rules:
1. Answer strictly using the provided context. Do not use outside knowledge.
2. When the answer is found in the context, cite the originating file(s) in the format [SOURCE: <file name>].
3. When the answer is not in the context, reply with exactly this sentence and nothing else:";

const EMPTY_CONTEXT_RULE: &str =
    "No onboarding documents are available, so you must reply with the refusal sentence above.";

/// Citation label for a source file, e.g. `[SOURCE: handbook.pdf]`.
pub fn citation(source: &str) -> String {
    format!("[SOURCE: {}]", source)
}

// ═══════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════

/// How the context section is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Top-k chunks from similarity search.
    #[default]
    Rag,
    /// Full text of every loaded document, for small corpora.
    FullDocument,
}

impl ContextMode {
    fn heading(&self) -> &'static str {
        match self {
            ContextMode::Rag => "Context (retrieved excerpts):",
            ContextMode::FullDocument => "Context (full onboarding documents):",
        }
    }
}

/// One labelled piece of context, in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlock {
    pub source: String,
    pub text: String,
}

impl ContextBlock {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }

    fn render(&self) -> String {
        format!("{}\n{}", citation(&self.source), self.text.trim())
    }
}

impl From<&ScoredChunk> for ContextBlock {
    fn from(scored: &ScoredChunk) -> Self {
        ContextBlock::new(scored.chunk.source.clone(), scored.chunk.text.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Prompt
// ═══════════════════════════════════════════════════════════════════════

/// An assembled prompt ready for a completion client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    /// System instruction carrying the grounding policy.
    pub system: String,
    /// Profile, context, and question.
    pub user: String,
    /// Source files of the context blocks that made it into the prompt.
    pub sources: Vec<String>,
    /// True when no context was available and the model is told to refuse.
    pub refusal_path: bool,
}

impl Prompt {
    /// Single-string form for backends without chat roles.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Deterministic prompt assembler.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    mode: ContextMode,
    max_context_chars: usize,
}

impl PromptBuilder {
    pub fn new(mode: ContextMode) -> Self {
        Self {
            mode,
            max_context_chars: 0,
        }
    }

    /// Cap the rendered context size in characters. `0` means no cap.
    ///
    /// The highest-ranked block is always kept; later blocks that would
    /// exceed the cap are dropped whole.
    pub fn max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn build(&self, profile: &UserProfile, blocks: &[ContextBlock], question: &str) -> Prompt {
        let kept = self.select(blocks);
        let refusal_path = kept.is_empty();

        let mut system = format!("{}\n\"{}\"", POLICY, REFUSAL_SENTENCE);
        if refusal_path {
            system.push('\n');
            system.push_str(EMPTY_CONTEXT_RULE);
        }

        let context = if refusal_path {
            EMPTY_CONTEXT_PLACEHOLDER.to_string()
        } else {
            render_context(&kept)
        };

        let user = format!(
            "The user's name is {}.\nTheir department is {}.\nTheir role is {}.\n\n{}\n{}\n\nQuestion: {}",
            profile.name,
            profile.department,
            profile.role,
            self.mode.heading(),
            context,
            question
        );

        let mut sources: Vec<String> = Vec::new();
        for b in &kept {
            if !sources.contains(&b.source) {
                sources.push(b.source.clone());
            }
        }

        Prompt {
            system,
            user,
            sources,
            refusal_path,
        }
    }

    fn select<'a>(&self, blocks: &'a [ContextBlock]) -> Vec<&'a ContextBlock> {
        let mut kept = Vec::new();
        let mut used = 0usize;
        for block in blocks.iter().filter(|b| !b.text.trim().is_empty()) {
            let separator = if kept.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
            let len = separator + block.render().chars().count();
            if self.max_context_chars > 0 && !kept.is_empty() && used + len > self.max_context_chars
            {
                break;
            }
            used += len;
            kept.push(block);
        }
        kept
    }
}

const BLOCK_SEPARATOR: &str = "\n\n";

fn render_context(blocks: &[&ContextBlock]) -> String {
    blocks
        .iter()
        .map(|b| b.render())
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
