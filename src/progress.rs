//! Index build progress reporting.
//!
//! Reports what the build is doing (loading documents, embedding chunks,
//! reusing a snapshot) so users are not left staring at a silent terminal
//! while a local model embeds a large handbook. Progress is emitted on
//! **stderr** so stdout stays reserved for answers.

use std::io::Write;

/// A single progress event from the index build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestProgressEvent {
    /// Scanning the docs folder.
    Loading { folder: String },
    /// Documents loaded and chunked.
    Loaded {
        documents: u64,
        pages: u64,
        chunks: u64,
        skipped: u64,
    },
    /// n chunks embedded out of total.
    Embedding { n: u64, total: u64 },
    /// A stored snapshot matched and was reused.
    SnapshotReused { chunks: u64 },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  embedding  128 / 1,024 chunks".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Loading { folder } => {
                format!("ingest  loading {}...\n", folder)
            }
            IngestProgressEvent::Loaded {
                documents,
                pages,
                chunks,
                skipped,
            } => format!(
                "ingest  loaded {} documents ({} pages, {} chunks, {} skipped)\n",
                format_number(*documents),
                format_number(*pages),
                format_number(*chunks),
                format_number(*skipped)
            ),
            IngestProgressEvent::Embedding { n, total } => format!(
                "ingest  embedding  {} / {} chunks\n",
                format_number(*n),
                format_number(*total)
            ),
            IngestProgressEvent::SnapshotReused { chunks } => format!(
                "ingest  reused index snapshot ({} chunks)\n",
                format_number(*chunks)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Loading { folder } => serde_json::json!({
                "event": "progress",
                "phase": "loading",
                "folder": folder
            }),
            IngestProgressEvent::Loaded {
                documents,
                pages,
                chunks,
                skipped,
            } => serde_json::json!({
                "event": "progress",
                "phase": "loaded",
                "documents": documents,
                "pages": pages,
                "chunks": chunks,
                "skipped": skipped
            }),
            IngestProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total
            }),
            IngestProgressEvent::SnapshotReused { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "snapshot_reused",
                "chunks": chunks
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
