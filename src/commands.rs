//! `onboard` command implementations.
//!
//! Each `run_*` function backs one CLI subcommand. Answers and listings go
//! to stdout; build progress goes to stderr through the progress reporter.

use anyhow::{bail, Result};
use onboard_rag_core::models::{ChatRole, Department, UserProfile};
use onboard_rag_core::stream::StreamEvent;
use onboard_rag_core::RagError;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::ingest::{build_knowledge_base, BuildReport};
use crate::profile::ProfileStore;
use crate::progress::IngestProgressReporter;
use crate::session::Session;
use crate::transcript::{JsonTranscriptStore, TranscriptStore};

const SETUP_HINT: &str = "No profile found. Create one first:\n  \
    onboard setup --name <NAME> --department <Engineering|HR|Sales|Other> --role <ROLE>";

pub fn run_setup(config: &Config, name: &str, department: Department, role: &str) -> Result<()> {
    if name.trim().is_empty() || role.trim().is_empty() {
        bail!("Name and role must not be empty.");
    }
    let profile = UserProfile {
        name: name.trim().to_string(),
        department,
        role: role.trim().to_string(),
    };
    let store = ProfileStore::new(config.storage.profile_path());
    store.save(&profile)?;
    println!(
        "Profile saved for {} ({}, {}).",
        profile.name, profile.department, profile.role
    );
    println!("  path: {}", store.path().display());
    Ok(())
}

pub fn run_profile_show(config: &Config) -> Result<()> {
    match ProfileStore::new(config.storage.profile_path()).load()? {
        Some(profile) => {
            println!("name:       {}", profile.name);
            println!("department: {}", profile.department);
            println!("role:       {}", profile.role);
        }
        None => println!("{}", SETUP_HINT),
    }
    Ok(())
}

/// Delete the profile and the transcript that belongs to it.
pub fn run_profile_reset(config: &Config) -> Result<()> {
    let removed = ProfileStore::new(config.storage.profile_path()).delete()?;
    JsonTranscriptStore::new(config.storage.transcript_path()).clear()?;
    if removed {
        println!("Profile and chat history deleted.");
    } else {
        println!("No profile to reset.");
    }
    Ok(())
}

pub async fn run_ingest(config: &Config, progress: &dyn IngestProgressReporter) -> Result<()> {
    let provider = create_provider(&config.embedding)?;
    let (kb, report) = build_knowledge_base(config, provider.as_ref(), progress).await?;
    print_report(config, &report);
    if !kb.has_documents() {
        println!();
        println!(
            "No documents found in {}; answers will use the refusal path.",
            config.docs.folder.display()
        );
    }
    Ok(())
}

fn print_report(config: &Config, report: &BuildReport) {
    println!("Index build");
    println!("===========");
    println!("  Folder:      {}", config.docs.folder.display());
    println!("  Model:       {}", report.model);
    println!("  Documents:   {}", report.documents);
    println!("  Pages:       {}", report.pages);
    println!("  Chunks:      {}", report.chunks);
    println!(
        "  Snapshot:    {}",
        if report.reused_snapshot { "reused" } else { "rebuilt" }
    );
    println!("  Took:        {} ms", report.elapsed_ms);
    if !report.failures.is_empty() {
        println!();
        println!("  Skipped ({}):", report.failures.len());
        for failure in &report.failures {
            println!("    - {}", failure);
        }
    }
}

/// Search does not need a profile, only documents and an embedding provider.
pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let provider = create_provider(&config.embedding)?;
    let (kb, _) = build_knowledge_base(config, provider.as_ref(), progress).await?;
    let k = k.unwrap_or(config.retrieval.top_k);
    if kb.index.is_empty() || k == 0 {
        println!("No results.");
        return Ok(());
    }

    let query_vec = provider.embed(query).await?;
    let hits = kb.index.similarity_search(&query_vec, k)?;
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (page {})",
            i + 1,
            hit.score,
            hit.chunk.source,
            hit.chunk.page + 1
        );
        println!(
            "    excerpt: \"{}\"",
            excerpt(&hit.chunk.text, 200).replace('\n', " ").trim()
        );
        println!();
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

async fn open_session(config: &Config, progress: &dyn IngestProgressReporter) -> Result<Session> {
    match Session::start(config.clone(), progress).await {
        Ok((session, _)) => Ok(session),
        Err(RagError::MissingProfile) => bail!(SETUP_HINT),
        Err(e) => Err(e.into()),
    }
}

pub async fn run_prompt(
    config: &Config,
    question: &str,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    let session = open_session(config, progress).await?;
    let prompt = session.prompt(question).await?;
    println!("--- System ---");
    println!("{}", prompt.system);
    println!();
    println!("--- User ---");
    println!("{}", prompt.user);
    println!();
    println!("--- Sources ({}) ---", prompt.sources.len());
    for source in &prompt.sources {
        println!("{}", source);
    }
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    no_stream: bool,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    let session = open_session(config, progress).await?;
    if no_stream {
        let answer = session.ask(question).await?;
        println!("{}", answer.text);
        print_sources(&answer.sources);
        return Ok(());
    }
    stream_answer(&session, question).await
}

/// Print a streamed answer as it arrives.
async fn stream_answer(session: &Session, question: &str) -> Result<()> {
    let mut answer = session.ask_streaming(question).await?;
    let mut stdout = std::io::stdout();
    while let Some(event) = answer.next_event().await {
        match event {
            Ok(StreamEvent::Fragment(text)) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            Ok(StreamEvent::Done) => {}
            Err(e) => {
                println!();
                return Err(e.into());
            }
        }
    }
    println!();
    print_sources(answer.sources());
    Ok(())
}

fn print_sources(sources: &[String]) {
    if !sources.is_empty() {
        println!("Sources: {}", sources.join(", "));
    }
}

/// Interactive loop: one question per stdin line until `exit`, `quit` or EOF.
pub async fn run_chat(config: &Config, progress: &dyn IngestProgressReporter) -> Result<()> {
    let session = open_session(config, progress).await?;
    println!("{}", session.greeting());
    println!("Type a question, or 'exit' to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "exit" | "quit" => break,
            _ => {}
        }
        // A failed answer ends that request, not the chat.
        if let Err(e) = stream_answer(&session, question).await {
            eprintln!("Error: {}", e);
        }
    }
    Ok(())
}

pub fn run_history_show(config: &Config) -> Result<()> {
    let turns = JsonTranscriptStore::new(config.storage.transcript_path()).load()?;
    if turns.is_empty() {
        println!("No chat history.");
        return Ok(());
    }
    for turn in &turns {
        let who = match turn.role {
            ChatRole::User => "you",
            ChatRole::Assistant => "assistant",
        };
        println!("[{}] {}:", turn.at.format("%Y-%m-%d %H:%M"), who);
        println!("{}", turn.content);
        println!();
    }
    Ok(())
}

pub fn run_history_clear(config: &Config) -> Result<()> {
    JsonTranscriptStore::new(config.storage.transcript_path()).clear()?;
    println!("Chat history cleared.");
    Ok(())
}
