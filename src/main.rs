//! # Deckhand CLI (`deck`)
//!
//! The `deck` binary is the primary interface for Deckhand. It provides
//! commands for database initialization, adding free-text notes, asking
//! questions about the board, loading board cards, and starting the
//! assistant HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! deck --config ./config/deck.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `deck init` | Create the SQLite database schema |
//! | `deck add "<text>"` | Store a free-text note in the vector index |
//! | `deck ask "<question>"` | Answer a question using retrieved context |
//! | `deck load-board` | Ingest every card from the project board |
//! | `deck serve` | Start the assistant HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! deck init --config ./config/deck.toml
//!
//! # Store a note
//! deck add "Standup moved to 9:30 starting next week"
//!
//! # Ask about the board
//! deck ask "what is due this week?"
//!
//! # Ask with extra inline context
//! deck ask "who owns the release?" --context "Release owner rotates weekly"
//!
//! # Load cards from the board configured in deck.toml
//! deck load-board
//!
//! # Load a specific board
//! deck load-board --board abc123
//!
//! # Start the HTTP assistant
//! deck serve
//! ```

mod board;
mod config;
mod embedding;
mod generate;
mod index;
mod models;
mod pipeline;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Deckhand CLI — a retrieval-augmented assistant for a project task board.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/deck.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "deck",
    about = "Deckhand — a retrieval-augmented assistant for a project task board",
    version,
    long_about = "Deckhand ingests cards from a project task board into a local SQLite vector \
    index and answers natural-language questions about them with a configurable LLM, via a CLI \
    and a JSON HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/deck.toml`. All database, embedding, generation,
    /// board, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/deck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the records table. This command
    /// is idempotent; running it multiple times is safe.
    Init,

    /// Store a free-text note in the vector index.
    ///
    /// Whitespace is normalized and the note is keyed by its content hash,
    /// so adding the same text twice updates one record instead of creating
    /// a duplicate.
    Add {
        /// The note text.
        text: String,
    },

    /// Answer a question using retrieved board context.
    ///
    /// Embeds the question, retrieves the nearest stored texts, and prompts
    /// the configured model with them.
    Ask {
        /// The question to answer.
        question: String,

        /// Extra context for this question. Persisted into the index unless
        /// `retrieval.persist_inline_context` is disabled in config.
        #[arg(long)]
        context: Option<String>,
    },

    /// Ingest every card from the project board.
    ///
    /// Fetches all cards, flattens each into a labeled text block, and
    /// upserts them into the index. Requires a `[board]` section in config.
    LoadBoard {
        /// Board id to load. Defaults to `board.board_id` from config.
        #[arg(long)]
        board: Option<String>,
    },

    /// Start the assistant HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// the assistant JSON API endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            index::sqlite::init_db(&cfg.db).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add { text } => {
            let assistant = pipeline::Pipeline::from_config(&cfg).await?;
            let normalized = assistant.add_text(&text).await?;
            println!("Added text: {}", normalized);
            println!("  id: {}", pipeline::content_id(&normalized));
        }
        Commands::Ask { question, context } => {
            let assistant = pipeline::Pipeline::from_config(&cfg).await?;
            let answer = assistant.answer(&question, context.as_deref()).await?;
            println!("{}", answer);
        }
        Commands::LoadBoard { board } => {
            let assistant = pipeline::Pipeline::from_config(&cfg).await?;
            println!("load-board");
            let count = assistant.load_board(board.as_deref()).await?;
            println!("  cards ingested: {}", count);
            println!("ok");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
