//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage operations the retrieval
//! pipeline needs: idempotent upsert of (id, text) records and k-nearest
//! search by cosine similarity. Implementations embed text themselves via
//! the [`Embedder`](crate::embedding::Embedder) they are constructed with,
//! so callers never handle raw vectors.
//!
//! Backends:
//! - [`SqliteIndex`] — durable storage via sqlx/SQLite (WAL), vectors as
//!   little-endian f32 blobs, ranking in Rust.
//! - [`MemoryIndex`] — `RwLock`-guarded vectors with brute-force cosine;
//!   for tests and library embedding.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SearchHit;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

/// Storage abstraction over (id, text, vector) records.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed `text` and store or replace the record at `id`.
    ///
    /// Overwrite semantics: a pre-existing `id` is replaced, never an
    /// error.
    async fn upsert(&self, id: &str, text: &str) -> Result<()>;

    /// Embed `query` and return up to `k` stored records ordered by cosine
    /// similarity, nearest first.
    ///
    /// An empty index yields an empty vec, never an error.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;
}
