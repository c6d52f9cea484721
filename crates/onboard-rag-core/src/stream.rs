//! Streaming response primitives.
//!
//! A completion stream is a finite sequence of [`StreamEvent::Fragment`]s
//! followed by exactly one [`StreamEvent::Done`]. [`NdjsonParser`] turns the
//! raw bytes of an Ollama chat stream into those events, and
//! [`ResponseBuffer`] accumulates fragments on the consumer side.

use crate::error::{RagError, Result};

/// One item of a completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of response text, to be appended to the running buffer.
    Fragment(String),
    /// Terminal marker; the response is complete.
    Done,
}

// ============================================================================
// NDJSON parser
// ============================================================================

/// Incremental parser for newline-delimited JSON chat streams.
///
/// Network chunks may split a line (or a multi-byte character) anywhere, so
/// bytes are buffered until a full line is available. Each line is expected
/// to look like `{"message":{"content":"..."},"done":false}`; a line with
/// `"done": true` produces [`StreamEvent::Done`] and an `"error"` field ends
/// the stream with [`RagError::StreamInterrupted`]. Lines that are not valid
/// JSON are skipped.
#[derive(Debug, Default)]
pub struct NdjsonParser {
    buffer: Vec<u8>,
    done: bool,
}

impl NdjsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the events completed by them.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buffer.extend_from_slice(data);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            self.parse_line(&line, &mut events)?;
        }
        Ok(events)
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>> {
        let line = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        self.parse_line(&line, &mut events)?;
        Ok(events)
    }

    /// Whether the terminal line has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn parse_line(&mut self, line: &[u8], events: &mut Vec<StreamEvent>) -> Result<()> {
        if self.done {
            return Ok(());
        }
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let json = match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => json,
            Err(_) => return Ok(()),
        };

        if let Some(message) = json["error"].as_str() {
            return Err(RagError::StreamInterrupted {
                reason: message.to_string(),
                partial: String::new(),
            });
        }

        let content = json["message"]["content"]
            .as_str()
            .or_else(|| json["response"].as_str())
            .unwrap_or("");
        if !content.is_empty() {
            events.push(StreamEvent::Fragment(content.to_string()));
        }

        if json["done"].as_bool().unwrap_or(false) {
            self.done = true;
            events.push(StreamEvent::Done);
        }
        Ok(())
    }
}

// ============================================================================
// Response buffer
// ============================================================================

/// Consumer-side accumulator for a streamed response.
///
/// Text is visible while streaming via [`text`](ResponseBuffer::text); only
/// [`into_complete`](ResponseBuffer::into_complete) after the terminal event
/// yields a response suitable for persisting.
#[derive(Debug, Default, Clone)]
pub struct ResponseBuffer {
    text: String,
    fragments: usize,
    complete: bool,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Fragments after `Done` are ignored.
    pub fn apply(&mut self, event: &StreamEvent) {
        if self.complete {
            return;
        }
        match event {
            StreamEvent::Fragment(f) => {
                self.text.push_str(f);
                self.fragments += 1;
            }
            StreamEvent::Done => self.complete = true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The finished response, or `None` if the terminal event never arrived.
    pub fn into_complete(self) -> Option<String> {
        self.complete.then_some(self.text)
    }
}
