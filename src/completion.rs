//! Completion clients.
//!
//! A [`CompletionClient`] turns a [`Prompt`] into either a whole response or
//! a [`CompletionStream`]. Streams are fed by a spawned producer task through
//! a bounded channel; the consumer pulls events with
//! [`CompletionStream::next_event`]. Dropping the stream abandons it and the
//! producer stops at its next send.
//!
//! | Config Value | Client |
//! |-------------|--------|
//! | `"ollama"` | [`OllamaCompletion`]: `/api/chat`, NDJSON streaming |
//! | `"echo"` | [`EchoCompletion`]: returns the rendered prompt |
//!
//! [`ScriptedCompletion`] replays fixed fragments and is used by tests.

use anyhow::bail;
use async_trait::async_trait;
use futures_util::StreamExt;
use onboard_rag_core::prompt::Prompt;
use onboard_rag_core::stream::{NdjsonParser, ResponseBuffer, StreamEvent};
use onboard_rag_core::RagError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{CompletionConfig, DEFAULT_OLLAMA_URL};

/// Capacity of the fragment channel between producer and consumer.
pub const STREAM_CHANNEL_CAPACITY: usize = 64;

type EventResult = Result<StreamEvent, RagError>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produce the whole response at once.
    async fn complete(&self, prompt: &Prompt) -> Result<String, RagError>;

    /// Start a streamed response.
    ///
    /// Errors before the first event (e.g. the backend is unreachable) are
    /// returned here; errors after that arrive through the stream.
    async fn stream(&self, prompt: &Prompt) -> Result<CompletionStream, RagError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Stream
// ═══════════════════════════════════════════════════════════════════════

/// Consumer end of a streamed completion.
///
/// Yields fragments, then exactly one [`StreamEvent::Done`], then `None`.
/// If the producer fails or disappears before `Done`, the stream yields a
/// single [`RagError::StreamInterrupted`] carrying the text received so far,
/// then `None`. It cannot be restarted.
pub struct CompletionStream {
    id: Uuid,
    rx: mpsc::Receiver<EventResult>,
    received: String,
    finished: bool,
}

impl CompletionStream {
    /// Create a stream and the sender its producer writes into.
    pub fn channel() -> (mpsc::Sender<EventResult>, CompletionStream) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        (
            tx,
            CompletionStream {
                id: Uuid::new_v4(),
                rx,
                received: String::new(),
                finished: false,
            },
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn next_event(&mut self) -> Option<EventResult> {
        if self.finished {
            return None;
        }

        match self.rx.recv().await {
            Some(Ok(StreamEvent::Fragment(text))) => {
                self.received.push_str(&text);
                Some(Ok(StreamEvent::Fragment(text)))
            }
            Some(Ok(StreamEvent::Done)) => {
                self.finished = true;
                tracing::debug!(stream = %self.id, chars = self.received.len(), "stream complete");
                Some(Ok(StreamEvent::Done))
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(self.interrupted(e.to_string())))
            }
            None => {
                self.finished = true;
                Some(Err(self.interrupted(
                    "stream closed before completion".to_string(),
                )))
            }
        }
    }

    fn interrupted(&mut self, reason: String) -> RagError {
        tracing::warn!(stream = %self.id, %reason, "stream interrupted");
        RagError::StreamInterrupted {
            reason,
            partial: std::mem::take(&mut self.received),
        }
    }

    /// Drain the stream into the full response text.
    pub async fn collect_text(mut self) -> Result<String, RagError> {
        let mut buffer = ResponseBuffer::new();
        while let Some(event) = self.next_event().await {
            buffer.apply(&event?);
        }
        Ok(buffer.into_complete().unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Ollama
// ═══════════════════════════════════════════════════════════════════════

/// Chat completion against an Ollama server (`POST /api/chat`).
pub struct OllamaCompletion {
    model: String,
    url: String,
    temperature: Option<f32>,
    /// Whole-request limit for `complete`, header wait for `stream`, and
    /// the longest gap allowed between streamed chunks.
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaCompletion {
    pub fn new(config: &CompletionConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        // No client-wide timeout: long answers stream for a while. Each call
        // bounds its own waits.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            client,
        })
    }

    fn request_body(&self, prompt: &Prompt, stream: bool) -> serde_json::Value {
        let mut options = serde_json::Map::new();
        if let Some(temp) = self.temperature {
            options.insert("temperature".to_string(), serde_json::json!(temp));
        }

        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "stream": stream,
            "options": options,
        })
    }

    async fn send(&self, prompt: &Prompt, stream: bool) -> Result<reqwest::Response, RagError> {
        let url = format!("{}/api/chat", self.url);
        let mut request = self.client.post(&url).json(&self.request_body(prompt, stream));
        if !stream {
            // Covers the body read in `complete` as well.
            request = request.timeout(self.timeout);
        }

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(RagError::unavailable("ollama", "request timeout"));
            }
            Ok(Err(e)) => {
                return Err(RagError::unavailable(
                    "ollama",
                    format!("connection error (is Ollama running at {}?): {}", self.url, e),
                ));
            }
            Err(_) => return Err(RagError::unavailable("ollama", "request timeout")),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::unavailable(
                "ollama",
                format!("API error {}: {}", status, text),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OllamaCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, RagError> {
        let json: serde_json::Value = self
            .send(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| RagError::unavailable("ollama", format!("invalid response: {}", e)))?;

        json["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RagError::unavailable("ollama", "invalid response: missing message content"))
    }

    async fn stream(&self, prompt: &Prompt) -> Result<CompletionStream, RagError> {
        let response = self.send(prompt, true).await?;
        let (tx, stream) = CompletionStream::channel();
        let chunk_timeout = self.timeout;
        tracing::debug!(stream = %stream.id(), model = %self.model, "ollama stream started");

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut parser = NdjsonParser::new();

            loop {
                let (events, body_ended) = match tokio::time::timeout(chunk_timeout, bytes.next()).await {
                    Ok(Some(Ok(chunk))) => (parser.push(&chunk), false),
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(RagError::unavailable("ollama", e))).await;
                        return;
                    }
                    Ok(None) => (parser.finish(), true),
                    Err(_) => {
                        let _ = tx
                            .send(Err(RagError::unavailable("ollama", "stream chunk timeout")))
                            .await;
                        return;
                    }
                };

                match events {
                    Ok(events) => {
                        for event in events {
                            if tx.send(Ok(event)).await.is_err() {
                                // Consumer dropped the stream.
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }

                // A body that ends without `done` drops `tx`; the consumer
                // sees the closed channel as an interruption.
                if parser.is_done() || body_ended {
                    return;
                }
            }
        });

        Ok(stream)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Echo
// ═══════════════════════════════════════════════════════════════════════

/// Returns the rendered prompt as the response. For dry runs and tests.
pub struct EchoCompletion;

#[async_trait]
impl CompletionClient for EchoCompletion {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, RagError> {
        Ok(prompt.render())
    }

    async fn stream(&self, prompt: &Prompt) -> Result<CompletionStream, RagError> {
        let fragments = prompt
            .render()
            .split_inclusive(' ')
            .map(|s| s.to_string())
            .collect();
        Ok(spawn_fragments(fragments, Ending::Done))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Scripted
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Done,
    Error,
    HangUp,
}

/// Replays a fixed list of fragments, optionally failing partway.
///
/// Prompts it receives are recorded for inspection.
pub struct ScriptedCompletion {
    fragments: Vec<String>,
    cut_after: Option<(usize, Ending)>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedCompletion {
    pub fn new<S: Into<String>>(fragments: impl IntoIterator<Item = S>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            cut_after: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Send an error after `n` fragments instead of finishing.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.cut_after = Some((n, Ending::Error));
        self
    }

    /// Close the channel after `n` fragments without a terminal event.
    pub fn hang_up_after(mut self, n: usize) -> Self {
        self.cut_after = Some((n, Ending::HangUp));
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn record(&self, prompt: &Prompt) {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, RagError> {
        self.record(prompt);
        if let Some((_, Ending::Error | Ending::HangUp)) = self.cut_after {
            return Err(RagError::unavailable("scripted", "scripted failure"));
        }
        Ok(self.fragments.concat())
    }

    async fn stream(&self, prompt: &Prompt) -> Result<CompletionStream, RagError> {
        self.record(prompt);
        let (fragments, ending) = match self.cut_after {
            Some((n, ending)) => (self.fragments.iter().take(n).cloned().collect(), ending),
            None => (self.fragments.clone(), Ending::Done),
        };
        Ok(spawn_fragments(fragments, ending))
    }
}

fn spawn_fragments(fragments: Vec<String>, ending: Ending) -> CompletionStream {
    let (tx, stream) = CompletionStream::channel();
    tokio::spawn(async move {
        for fragment in fragments {
            if tx.send(Ok(StreamEvent::Fragment(fragment))).await.is_err() {
                return;
            }
            tokio::task::yield_now().await;
        }
        match ending {
            Ending::Done => {
                let _ = tx.send(Ok(StreamEvent::Done)).await;
            }
            Ending::Error => {
                let _ = tx
                    .send(Err(RagError::unavailable("scripted", "connection reset")))
                    .await;
            }
            Ending::HangUp => {}
        }
    });
    stream
}

/// Create the completion client named by the configuration.
pub fn create_completion(config: &CompletionConfig) -> anyhow::Result<Arc<dyn CompletionClient>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaCompletion::new(config)?)),
        "echo" => Ok(Arc::new(EchoCompletion)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onboard_rag_core::models::{Department, UserProfile};
    use onboard_rag_core::prompt::{ContextBlock, ContextMode, PromptBuilder};

    fn prompt() -> Prompt {
        let profile = UserProfile {
            name: "Grace".into(),
            department: Department::Sales,
            role: "Account Executive".into(),
        };
        PromptBuilder::new(ContextMode::Rag).build(
            &profile,
            &[ContextBlock::new("handbook.pdf", "Badges are issued on day one.")],
            "When do I get my badge?",
        )
    }

    #[tokio::test]
    async fn test_scripted_stream_concatenates() {
        let client = ScriptedCompletion::new(["Hel", "lo wo", "rld"]);
        let mut stream = client.stream(&prompt()).await.unwrap();
        let mut buffer = ResponseBuffer::new();
        let mut events = 0;
        while let Some(event) = stream.next_event().await {
            buffer.apply(&event.unwrap());
            events += 1;
        }
        assert_eq!(events, 4);
        assert_eq!(buffer.into_complete().as_deref(), Some("Hello world"));
        assert!(stream.next_event().await.is_none());
        assert_eq!(client.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_hang_up_is_interrupted_with_partial() {
        let client = ScriptedCompletion::new(["Hel", "lo wo", "rld"]).hang_up_after(2);
        let mut stream = client.stream(&prompt()).await.unwrap();
        let mut last = None;
        while let Some(event) = stream.next_event().await {
            last = Some(event);
        }
        match last {
            Some(Err(RagError::StreamInterrupted { partial, .. })) => assert_eq!(partial, "Hello wo"),
            other => panic!("expected interruption, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_error_is_interrupted() {
        let client = ScriptedCompletion::new(["a", "b"]).fail_after(1);
        let err = client.stream(&prompt()).await.unwrap().collect_text().await.unwrap_err();
        assert_eq!(err.partial_response(), Some("a"));
    }

    #[tokio::test]
    async fn test_echo_complete_and_stream_agree() {
        let p = prompt();
        let whole = EchoCompletion.complete(&p).await.unwrap();
        let streamed = EchoCompletion.stream(&p).await.unwrap().collect_text().await.unwrap();
        assert_eq!(whole, streamed);
        assert!(whole.contains("When do I get my badge?"));
        assert!(whole.contains("Grace"));
    }

    #[tokio::test]
    async fn test_more_fragments_than_channel_capacity() {
        let fragments: Vec<String> = (0..200).map(|i| format!("{} ", i)).collect();
        let expected = fragments.concat();
        let client = ScriptedCompletion::new(fragments);
        let text = client.stream(&prompt()).await.unwrap().collect_text().await.unwrap();
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn test_unreachable_ollama() {
        let client = OllamaCompletion::new(&CompletionConfig {
            url: Some("http://127.0.0.1:1".into()),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            client.complete(&prompt()).await,
            Err(RagError::ProviderUnavailable { .. })
        ));
        assert!(matches!(
            client.stream(&prompt()).await,
            Err(RagError::ProviderUnavailable { .. })
        ));
    }

    // ============ Local HTTP server ============

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// What the local server does after reading the request.
    enum Reply {
        /// Chunked NDJSON body, one HTTP chunk per entry, then end of body.
        Chunks(Vec<&'static str>),
        /// Chunked body that stops sending after these entries.
        ChunksThenStall(Vec<&'static str>),
        /// Accept and read the request, never answer.
        Silent,
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let body_len = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + body_len {
                return;
            }
        }
    }

    async fn serve_once(reply: Reply) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let (chunks, stall) = match reply {
                Reply::Silent => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    return;
                }
                Reply::Chunks(chunks) => (chunks, false),
                Reply::ChunksThenStall(chunks) => (chunks, true),
            };
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            for chunk in chunks {
                let framed = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
                socket.write_all(framed.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn local_client(url: String) -> OllamaCompletion {
        OllamaCompletion::new(&CompletionConfig {
            url: Some(url),
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_ollama_stream_joins_lines_split_across_chunks() {
        let url = serve_once(Reply::Chunks(vec![
            "{\"message\":{\"content\":\"Hel\"},\"do",
            "ne\":false}\n{\"message\":{\"content\":\"lo wo\"},\"done\":false}\n{\"mess",
            "age\":{\"content\":\"rld\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n",
        ]))
        .await;
        let text = local_client(url)
            .stream(&prompt())
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn test_ollama_body_without_done_is_interrupted() {
        let url = serve_once(Reply::Chunks(vec![
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
        ]))
        .await;
        let err = local_client(url)
            .stream(&prompt())
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap_err();
        match err {
            RagError::StreamInterrupted { partial, .. } => assert_eq!(partial, "Hel"),
            other => panic!("expected interruption, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_ollama_stalled_stream_hits_chunk_timeout() {
        let url = serve_once(Reply::ChunksThenStall(vec![
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
        ]))
        .await;
        let stream = local_client(url).stream(&prompt()).await.unwrap();
        let err = tokio::time::timeout(Duration::from_secs(10), stream.collect_text())
            .await
            .expect("chunk timeout did not fire")
            .unwrap_err();
        assert_eq!(err.partial_response(), Some("Hel"));
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn test_silent_server_times_out_complete() {
        let client = local_client(serve_once(Reply::Silent).await);
        let result = tokio::time::timeout(Duration::from_secs(10), client.complete(&prompt()))
            .await
            .expect("complete hung on a silent server");
        assert!(matches!(result, Err(RagError::ProviderUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_silent_server_times_out_stream_start() {
        let client = local_client(serve_once(Reply::Silent).await);
        let result = tokio::time::timeout(Duration::from_secs(10), client.stream(&prompt()))
            .await
            .expect("stream start hung on a silent server");
        match result {
            Err(RagError::ProviderUnavailable { reason, .. }) => assert_eq!(reason, "request timeout"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("stream started without a response"),
        }
    }

    #[test]
    fn test_create_completion() {
        let echo = create_completion(&CompletionConfig {
            provider: "echo".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(echo.model_name(), "echo");
        assert_eq!(
            create_completion(&CompletionConfig::default()).unwrap().model_name(),
            "llama3.2:1b"
        );
    }
}
