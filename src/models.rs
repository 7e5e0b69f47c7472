//! Core data models used throughout deckhand.
//!
//! These types represent the records stored in the vector index, the search
//! hits returned from it, and the normalized board cards produced by the
//! ingestion adapter.

/// A stored unit of text in the vector index.
///
/// For free text the id is content-derived (`doc_<sha256>`); for board
/// cards it is a positional sequence id (`card_0`, `card_1`, …) assigned
/// during a single load run.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A ranked result returned from [`VectorIndex::search`](crate::index::VectorIndex::search).
///
/// Carries the stored text plus its cosine similarity to the query so
/// callers can assemble context without a second lookup.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Normalized view of an external board card, produced transiently during
/// ingestion and flattened into a [`Record`] — never persisted as-is.
///
/// `column` and each entry of `assignees` are already sentinel-resolved at
/// fetch time (lookup failures become `"unknown"` / inline error markers).
/// `due` holds the raw upstream timestamp string; formatting happens at
/// flatten time. `comments` is `None` when the comment lookup itself
/// failed, which is distinct from `Some(vec![])` (card has no comments).
#[derive(Debug, Clone)]
pub struct BoardCard {
    pub name: String,
    pub column: String,
    pub assignees: Vec<String>,
    pub due: Option<String>,
    pub description: Option<String>,
    pub comments: Option<Vec<String>>,
}
