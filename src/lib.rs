//! # Deckhand
//!
//! A retrieval-augmented assistant for a project task board.
//!
//! Deckhand ingests cards from a board REST API (plus any free-text notes
//! you add), embeds them into a local SQLite vector index, and answers
//! natural-language questions about them with a configurable LLM, via a
//! CLI and a JSON HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Board cards │──▶│  Pipeline   │──▶│  SQLite  │
//! │ + free text │   │ Embed+Store │   │ vectors  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │ top-k
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌───────────┐
//!                 │   CLI    │       │   HTTP    │
//!                 │  (deck)  │       │ assistant │
//!                 └──────────┘       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! deck init                          # create database
//! deck load-board                    # ingest board cards
//! deck add "Retro moved to Friday"   # store a note
//! deck ask "what is due this week?"  # ask the model
//! deck serve                         # start HTTP assistant
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`board`] | Board REST API client and card flattening |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index (SQLite and in-memory backends) |
//! | [`generate`] | Answer generation provider abstraction |
//! | [`pipeline`] | Retrieval pipeline orchestration |
//! | [`server`] | Assistant HTTP server |

pub mod board;
pub mod config;
pub mod embedding;
pub mod generate;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod server;
