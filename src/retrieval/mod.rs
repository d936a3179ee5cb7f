//! Retrieval over indexed chunks
//!
//! Combines vector search with metadata filtering (document scope, topic
//! membership, used-chunk exclusion) and a deterministic ranking order:
//! descending similarity, ties broken by ascending page number then chunk id.

mod retriever;

pub use retriever::{Retriever, RetrieverSettings, SearchError};

use crate::document::Chunk;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A retrieved chunk with its similarity score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in [-1, 1], higher is more relevant
    pub score: f32,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }

    /// Get a short preview of the chunk text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.chunk.content.len() <= max_chars {
            self.chunk.content.clone()
        } else {
            let cut = self
                .chunk
                .content
                .char_indices()
                .take_while(|(i, _)| *i < max_chars)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            format!("{}...", &self.chunk.content[..cut])
        }
    }
}

/// Candidate restrictions applied after vector search
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilter {
    /// Restrict to these documents; `None` means the whole session scope
    pub document_ids: Option<HashSet<Uuid>>,
    /// Restrict to chunks tagged with this topic
    pub topic: Option<String>,
    /// Chunks already used for earlier questions
    pub exclude_chunk_ids: HashSet<i64>,
}

/// A retrieval request
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub text: String,
    pub limit: usize,
    pub filter: RetrievalFilter,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            limit,
            filter: RetrievalFilter::default(),
        }
    }
}

/// Sort chunks by descending score, breaking ties by page then chunk id,
/// and drop duplicate chunk ids keeping the best-ranked instance.
pub fn rank_chunks(mut chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.page_number.cmp(&b.chunk.page_number))
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });

    let mut seen: AHashSet<i64> = AHashSet::new();
    chunks.retain(|c| seen.insert(c.chunk.id));
    chunks
}
