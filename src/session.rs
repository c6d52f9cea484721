//! Chat session.
//!
//! A [`Session`] bundles everything one user's conversation needs: config,
//! profile, the shared index handle, the embedding provider, the completion
//! client, and the transcript store. Every query-time operation goes through
//! it. Query errors are per request; the transcript only ever receives a
//! question together with its complete answer.

use onboard_rag_core::embedding::EmbeddingProvider;
use onboard_rag_core::models::{ChatTurn, ScoredChunk, UserProfile};
use onboard_rag_core::prompt::{ContextBlock, ContextMode, Prompt, PromptBuilder};
use onboard_rag_core::stream::{ResponseBuffer, StreamEvent};
use onboard_rag_core::RagError;
use std::sync::Arc;

use crate::completion::{create_completion, CompletionClient, CompletionStream};
use crate::config::Config;
use crate::embedding::create_provider;
use crate::ingest::{BuildReport, IndexHandle, KnowledgeBase};
use crate::profile::ProfileStore;
use crate::progress::IngestProgressReporter;
use crate::transcript::{JsonTranscriptStore, TranscriptStore};

pub struct Session {
    config: Config,
    profile: UserProfile,
    index: Arc<IndexHandle>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionClient>,
    transcript: Arc<dyn TranscriptStore>,
    builder: PromptBuilder,
}

/// A whole (non-streamed) answer.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Documents whose text was in the prompt.
    pub sources: Vec<String>,
    pub refusal_path: bool,
}

impl Session {
    /// A session with an empty index. Call [`Session::rebuild`] to load documents.
    pub fn new(
        config: Config,
        profile: UserProfile,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionClient>,
        transcript: Arc<dyn TranscriptStore>,
    ) -> Self {
        let builder = PromptBuilder::new(config.retrieval.mode)
            .max_context_chars(config.retrieval.max_context_chars);
        Self {
            config,
            profile,
            index: Arc::new(IndexHandle::new()),
            embedder,
            completion,
            transcript,
            builder,
        }
    }

    /// Wire up the stored profile and the configured providers.
    ///
    /// Fails with [`RagError::MissingProfile`] before a profile exists.
    pub fn from_config(config: Config) -> Result<Self, RagError> {
        let profile = ProfileStore::new(config.storage.profile_path())
            .load()?
            .ok_or(RagError::MissingProfile)?;
        let embedder = create_provider(&config.embedding)?;
        let completion = create_completion(&config.completion)?;
        let transcript = Arc::new(JsonTranscriptStore::new(config.storage.transcript_path()));
        Ok(Self::new(config, profile, embedder, completion, transcript))
    }

    /// [`Session::from_config`] followed by an index build.
    pub async fn start(
        config: Config,
        progress: &dyn IngestProgressReporter,
    ) -> Result<(Self, BuildReport), RagError> {
        let session = Self::from_config(config)?;
        let report = session.rebuild(progress).await?;
        Ok((session, report))
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn knowledge_base(&self) -> Arc<KnowledgeBase> {
        self.index.snapshot()
    }

    pub fn greeting(&self) -> String {
        format!(
            "Welcome back, {}!\nI am your {} onboarding assistant.",
            self.profile.name, self.profile.department
        )
    }

    /// Build the index from the docs folder and publish it.
    pub async fn rebuild(
        &self,
        progress: &dyn IngestProgressReporter,
    ) -> Result<BuildReport, RagError> {
        self.index
            .rebuild(&self.config, self.embedder.as_ref(), progress)
            .await
    }

    /// Top `retrieval.top_k` chunks for `query`.
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredChunk>, RagError> {
        self.search_k(query, self.config.retrieval.top_k).await
    }

    /// Top `k` chunks for `query`, best first. Empty when nothing is indexed.
    pub async fn search_k(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        let kb = self.index.snapshot();
        if kb.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;
        kb.index.similarity_search(&vector, k)
    }

    /// Assemble the prompt for `question` under the configured context mode.
    pub async fn prompt(&self, question: &str) -> Result<Prompt, RagError> {
        let blocks = match self.builder.mode() {
            ContextMode::Rag => self
                .search(question)
                .await?
                .iter()
                .map(ContextBlock::from)
                .collect(),
            ContextMode::FullDocument => self.index.snapshot().full_document_blocks(),
        };
        let prompt = self.builder.build(&self.profile, &blocks, question);
        tracing::debug!(
            sources = ?prompt.sources,
            refusal_path = prompt.refusal_path,
            "prompt assembled"
        );
        Ok(prompt)
    }

    /// Answer `question` in one piece and record the exchange.
    pub async fn ask(&self, question: &str) -> Result<Answer, RagError> {
        let user_turn = ChatTurn::user(question);
        let prompt = self.prompt(question).await?;
        let text = self.completion.complete(&prompt).await?;
        self.transcript
            .append(&[user_turn, ChatTurn::assistant(text.clone())])?;
        Ok(Answer {
            text,
            sources: prompt.sources,
            refusal_path: prompt.refusal_path,
        })
    }

    /// Start a streamed answer to `question`.
    ///
    /// The exchange is recorded only when the stream reaches its terminal
    /// event. Dropping the [`AnswerStream`] early records nothing.
    pub async fn ask_streaming(&self, question: &str) -> Result<AnswerStream, RagError> {
        let user_turn = ChatTurn::user(question);
        let prompt = self.prompt(question).await?;
        let stream = self.completion.stream(&prompt).await?;
        tracing::debug!(stream = %stream.id(), model = self.completion.model_name(), "answer streaming");
        Ok(AnswerStream {
            user_turn: Some(user_turn),
            stream,
            buffer: ResponseBuffer::new(),
            transcript: Arc::clone(&self.transcript),
            sources: prompt.sources,
        })
    }

    pub fn history(&self) -> Result<Vec<ChatTurn>, RagError> {
        Ok(self.transcript.load()?)
    }

    pub fn clear_history(&self) -> Result<(), RagError> {
        Ok(self.transcript.clear()?)
    }

    /// Delete the stored profile and transcript, ending the session.
    pub fn reset(self) -> Result<(), RagError> {
        self.transcript.clear()?;
        ProfileStore::new(self.config.storage.profile_path()).delete()?;
        tracing::info!("profile reset");
        Ok(())
    }
}

/// A streamed answer in progress.
pub struct AnswerStream {
    user_turn: Option<ChatTurn>,
    stream: CompletionStream,
    buffer: ResponseBuffer,
    transcript: Arc<dyn TranscriptStore>,
    sources: Vec<String>,
}

impl AnswerStream {
    /// Next event from the model. On [`StreamEvent::Done`] the exchange is
    /// appended to the transcript before the event is handed back.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, RagError>> {
        let event = match self.stream.next_event().await? {
            Ok(event) => event,
            Err(e) => return Some(Err(e)),
        };
        self.buffer.apply(&event);
        if event == StreamEvent::Done {
            tracing::debug!(
                fragments = self.buffer.fragments(),
                chars = self.buffer.text().len(),
                "answer complete"
            );
            if let Some(user_turn) = self.user_turn.take() {
                let answer = ChatTurn::assistant(self.buffer.text());
                if let Err(e) = self.transcript.append(&[user_turn, answer]) {
                    return Some(Err(e.into()));
                }
            }
        }
        Some(Ok(event))
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Drain the rest of the stream and return the full answer.
    pub async fn finish(mut self) -> Result<String, RagError> {
        while let Some(event) = self.next_event().await {
            event?;
        }
        Ok(self.buffer.text().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{EchoCompletion, ScriptedCompletion};
    use crate::progress::NoProgress;
    use crate::transcript::MemoryTranscriptStore;
    use onboard_rag_core::embedding::HashEmbedder;
    use onboard_rag_core::models::{ChatRole, Department};
    use onboard_rag_core::prompt::REFUSAL_SENTENCE;
    use std::path::Path;
    use tempfile::TempDir;

    fn profile() -> UserProfile {
        UserProfile {
            name: "Avery".into(),
            department: Department::Engineering,
            role: "Junior Software Engineer".into(),
        }
    }

    fn config_for(docs: &Path) -> Config {
        let mut config = Config::default();
        config.docs.folder = docs.to_path_buf();
        config.docs.include_globs = vec!["**/*.txt".into()];
        config.retrieval.top_k = 2;
        config
    }

    fn session(
        config: Config,
        completion: Arc<dyn CompletionClient>,
    ) -> (Session, Arc<MemoryTranscriptStore>) {
        let transcript = Arc::new(MemoryTranscriptStore::new());
        let session = Session::new(
            config,
            profile(),
            Arc::new(HashEmbedder::new(128)),
            completion,
            transcript.clone(),
        );
        (session, transcript)
    }

    #[tokio::test]
    async fn test_stream_persists_only_after_done() {
        let tmp = TempDir::new().unwrap();
        let scripted = Arc::new(ScriptedCompletion::new(["Hel", "lo wo", "rld"]));
        let (session, transcript) = session(config_for(tmp.path()), scripted.clone());

        let mut answer = session.ask_streaming("Where is the office?").await.unwrap();
        for _ in 0..3 {
            let event = answer.next_event().await.unwrap().unwrap();
            assert!(matches!(event, StreamEvent::Fragment(_)));
            assert!(transcript.load().unwrap().is_empty());
        }
        assert_eq!(answer.text(), "Hello world");

        assert_eq!(answer.next_event().await.unwrap().unwrap(), StreamEvent::Done);
        assert!(answer.next_event().await.is_none());

        let turns = session.history().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::User);
        assert_eq!(turns[0].content, "Where is the office?");
        assert_eq!(turns[1].content, "Hello world");
        assert_eq!(scripted.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_stream_persists_nothing() {
        let tmp = TempDir::new().unwrap();
        let scripted = Arc::new(ScriptedCompletion::new(["Hel", "lo wo", "rld"]).fail_after(2));
        let (session, transcript) = session(config_for(tmp.path()), scripted);

        let err = session
            .ask_streaming("q")
            .await
            .unwrap()
            .finish()
            .await
            .unwrap_err();
        assert_eq!(err.partial_response(), Some("Hello wo"));
        assert!(transcript.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_stream_persists_nothing() {
        let tmp = TempDir::new().unwrap();
        let scripted = Arc::new(ScriptedCompletion::new(["a", "b"]));
        let (session, transcript) = session(config_for(tmp.path()), scripted);

        let mut answer = session.ask_streaming("q").await.unwrap();
        answer.next_event().await.unwrap().unwrap();
        drop(answer);
        assert!(transcript.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_takes_refusal_path() {
        let tmp = TempDir::new().unwrap();
        let (session, _) = session(config_for(tmp.path()), Arc::new(EchoCompletion));
        session.rebuild(&NoProgress).await.unwrap();

        assert!(session.search("anything").await.unwrap().is_empty());
        let prompt = session.prompt("How many vacation days?").await.unwrap();
        assert!(prompt.refusal_path);
        assert!(prompt.system.contains(REFUSAL_SENTENCE));

        let answer = session.ask("How many vacation days?").await.unwrap();
        assert!(answer.refusal_path);
        assert!(answer.text.contains("How many vacation days?"));
        assert!(answer.text.contains("Avery"));
        assert_eq!(session.history().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rag_prompt_uses_retrieved_chunks() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("handbook.txt"),
            "The vacation policy is 20 days per year.",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("benefits.txt"),
            "Health insurance starts on the first of the month.",
        )
        .unwrap();
        let (session, _) = session(config_for(tmp.path()), Arc::new(EchoCompletion));
        session.rebuild(&NoProgress).await.unwrap();

        let hits = session.search("How many vacation days per year?").await.unwrap();
        assert_eq!(hits[0].chunk.source, "handbook.txt");

        let prompt = session.prompt("How many vacation days per year?").await.unwrap();
        assert!(!prompt.refusal_path);
        assert!(prompt.user.contains("The vacation policy is 20 days per year."));
        assert_eq!(prompt.sources[0], "handbook.txt");
    }

    #[tokio::test]
    async fn test_full_document_mode_includes_every_document() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "Alpha text.").unwrap();
        std::fs::write(tmp.path().join("b.txt"), "Beta text.").unwrap();
        let mut config = config_for(tmp.path());
        config.retrieval.mode = ContextMode::FullDocument;
        let (session, _) = session(config, Arc::new(EchoCompletion));
        session.rebuild(&NoProgress).await.unwrap();

        let prompt = session.prompt("q").await.unwrap();
        assert_eq!(prompt.sources, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert!(prompt.user.contains("Alpha text."));
        assert!(prompt.user.contains("Beta text."));
    }

    #[test]
    fn test_greeting() {
        let tmp = TempDir::new().unwrap();
        let (session, _) = session(config_for(tmp.path()), Arc::new(EchoCompletion));
        assert_eq!(
            session.greeting(),
            "Welcome back, Avery!\nI am your Engineering onboarding assistant."
        );
    }

    #[test]
    fn test_from_config_requires_profile() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();
        assert!(matches!(
            Session::from_config(config),
            Err(RagError::MissingProfile)
        ));
    }
}
