//! In-memory [`VectorIndex`] implementation for tests and embedding.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over all stored vectors.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, embed_one, Embedder};
use crate::models::{Record, SearchHit};

use super::VectorIndex;

/// In-memory index. Not durable; contents are lost when dropped.
pub struct MemoryIndex {
    embedder: Box<dyn Embedder>,
    records: RwLock<Vec<Record>>,
}

impl MemoryIndex {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, id: &str, text: &str) -> Result<()> {
        let vector = embed_one(self.embedder.as_ref(), text).await?;

        let mut records = self.records.write().unwrap();
        records.retain(|r| r.id != id);
        records.push(Record {
            id: id.to_string(),
            text: text.to_string(),
            vector,
        });
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if self.records.read().unwrap().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_one(self.embedder.as_ref(), query).await?;

        let records = self.records.read().unwrap();
        let mut hits: Vec<SearchHit> = records
            .iter()
            .map(|r| SearchHit {
                id: r.id.clone(),
                text: r.text.clone(),
                score: cosine_similarity(&query_vec, &r.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().unwrap().len())
    }
}
