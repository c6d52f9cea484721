//! # Onboard CLI (`onboard`)
//!
//! Command-line front end for the onboarding assistant.
//!
//! ## Usage
//!
//! ```bash
//! onboard --config ./config/onboard.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `onboard setup` | Create the user profile |
//! | `onboard profile show\|reset` | Show or delete the profile |
//! | `onboard ingest` | Build the index and print a report |
//! | `onboard search "<query>"` | Show the best-matching chunks |
//! | `onboard prompt "<question>"` | Print the assembled prompt |
//! | `onboard ask "<question>"` | Answer one question |
//! | `onboard chat` | Interactive question loop |
//! | `onboard history show\|clear` | Show or clear the transcript |

use clap::{Parser, Subcommand};
use onboard_rag::progress::ProgressMode;
use onboard_rag::{commands, config, logging};
use onboard_rag_core::models::Department;
use std::path::PathBuf;

/// Onboarding assistant that answers questions from company PDFs.
#[derive(Parser)]
#[command(name = "onboard", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/onboard.toml`. A missing file means all defaults.
    #[arg(long, global = true, default_value = "./config/onboard.toml")]
    config: PathBuf,

    /// Index build progress on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or replace the user profile.
    Setup {
        #[arg(long)]
        name: String,

        /// One of Engineering, HR, Sales, Other.
        #[arg(long)]
        department: Department,

        /// Job title, e.g. "Junior Software Engineer".
        #[arg(long)]
        role: String,
    },

    /// Show or reset the user profile.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Build the index from the docs folder and print a report.
    Ingest,

    /// Show the chunks that best match a query.
    Search {
        query: String,

        /// Number of results. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Print the prompt that would be sent for a question.
    Prompt { question: String },

    /// Answer a single question.
    Ask {
        question: String,

        /// Wait for the whole answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,
    },

    /// Interactive chat on stdin.
    Chat,

    /// Show or clear the chat transcript.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    Show,
    /// Delete the profile and its chat history.
    Reset,
}

#[derive(Subcommand)]
enum HistoryAction {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Setup {
            name,
            department,
            role,
        } => commands::run_setup(&cfg, &name, department, &role)?,
        Commands::Profile { action } => match action {
            ProfileAction::Show => commands::run_profile_show(&cfg)?,
            ProfileAction::Reset => commands::run_profile_reset(&cfg)?,
        },
        Commands::Ingest => commands::run_ingest(&cfg, progress.as_ref()).await?,
        Commands::Search { query, k } => {
            commands::run_search(&cfg, &query, k, progress.as_ref()).await?
        }
        Commands::Prompt { question } => {
            commands::run_prompt(&cfg, &question, progress.as_ref()).await?
        }
        Commands::Ask {
            question,
            no_stream,
        } => commands::run_ask(&cfg, &question, no_stream, progress.as_ref()).await?,
        Commands::Chat => commands::run_chat(&cfg, progress.as_ref()).await?,
        Commands::History { action } => match action {
            HistoryAction::Show => commands::run_history_show(&cfg)?,
            HistoryAction::Clear => commands::run_history_clear(&cfg)?,
        },
    }

    Ok(())
}
