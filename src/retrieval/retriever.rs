//! Retriever: filtered vector search with relaxation policy
//!
//! Over-fetches candidates from the vector index, hydrates chunk rows from
//! storage, then applies the metadata filter. When the filtered pool comes up
//! empty the used-chunk exclusion is relaxed before the topic filter: topic
//! focus is honored more strictly than repeat-avoidance.

use crate::embedding::{EmbeddingProvider, VectorIndex};
use crate::retrieval::{rank_chunks, RetrievalFilter, RetrievalQuery, ScoredChunk};
use crate::storage::StorageManager;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("No indexed content available for {scope}")]
    EmptyScope { scope: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Tuning knobs copied out of the retrieval section of the config
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub search_multiplier: usize,
    pub min_candidate_pool: usize,
    pub hnsw_ef_search: usize,
    pub min_similarity: f32,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            search_multiplier: 10,
            min_candidate_pool: 128,
            hnsw_ef_search: 64,
            min_similarity: 0.0,
        }
    }
}

impl From<&crate::config::RetrievalConfig> for RetrieverSettings {
    fn from(config: &crate::config::RetrievalConfig) -> Self {
        Self {
            search_multiplier: config.search_multiplier,
            min_candidate_pool: config.min_candidate_pool,
            hnsw_ef_search: config.hnsw_ef_search,
            min_similarity: config.min_similarity,
        }
    }
}

/// Retriever over one session's index partition
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    storage: Arc<StorageManager>,
    settings: RetrieverSettings,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        storage: Arc<StorageManager>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            storage,
            settings,
        }
    }

    /// Search the session's chunks for a query
    pub fn search(&self, query: &RetrievalQuery) -> Result<Vec<ScoredChunk>, SearchError> {
        if query.text.trim().is_empty() {
            return Err(SearchError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        if self.index.is_empty() {
            return Err(SearchError::EmptyScope {
                scope: "this session (no documents indexed)".to_string(),
            });
        }

        let candidates = self.fetch_candidates(&query.text, query.limit)?;

        // Strict pass, then relax exclusions, then relax the topic filter.
        let filtered = self.apply_filter(&candidates, &query.filter, true, true);
        let filtered = if filtered.is_empty() {
            tracing::debug!("Filtered pool empty, allowing repeated chunks");
            self.apply_filter(&candidates, &query.filter, false, true)
        } else {
            filtered
        };
        let filtered = if filtered.is_empty() && query.filter.topic.is_some() {
            tracing::debug!("Filtered pool still empty, dropping topic filter");
            self.apply_filter(&candidates, &query.filter, false, false)
        } else {
            filtered
        };

        if filtered.is_empty() {
            return Err(SearchError::EmptyScope {
                scope: scope_label(&query.filter),
            });
        }

        let mut ranked = rank_chunks(filtered);
        ranked.truncate(query.limit);
        Ok(ranked)
    }

    /// Retrieve grounding contexts for the next question
    ///
    /// The query string comes from the session's topic focus when set,
    /// otherwise from a generic key-concepts probe seeded with the documents'
    /// aggregate topics.
    pub fn retrieve_for_question(
        &self,
        topic_focus: Option<&str>,
        aggregate_topics: &[String],
        limit: usize,
        used_chunk_ids: &std::collections::HashSet<i64>,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        let text = match topic_focus {
            Some(topic) => format!("key concepts and definitions about {}", topic),
            None if !aggregate_topics.is_empty() => {
                let seeds = aggregate_topics
                    .iter()
                    .take(6)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("key concepts and definitions: {}", seeds)
            }
            None => "key concepts, definitions, and important principles".to_string(),
        };

        let mut query = RetrievalQuery::new(text, limit.max(1));
        query.filter.topic = topic_focus.map(|t| t.to_string());
        query.filter.exclude_chunk_ids = used_chunk_ids.clone();

        self.search(&query)
    }

    /// Embed the query and over-fetch hydrated candidates
    fn fetch_candidates(&self, text: &str, limit: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        let query_embedding = self
            .embedder
            .embed(text)
            .map_err(|e| SearchError::Embedding(e.to_string()))?;

        let fetch = (limit * self.settings.search_multiplier).max(self.settings.min_candidate_pool);

        let hits = self
            .index
            .search(&query_embedding, fetch, self.settings.hnsw_ef_search)
            .map_err(|e| SearchError::VectorSearch(e.to_string()))?;

        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        let score_map: ahash::AHashMap<i64, f32> =
            hits.into_iter().map(|h| (h.id, h.score)).collect();

        let chunks = self
            .storage
            .database
            .get_chunks(&ids)
            .map_err(|e| SearchError::Database(e.to_string()))?;

        let candidates = chunks
            .into_iter()
            .filter_map(|chunk| {
                let score = score_map.get(&chunk.id).copied()?;
                if score < self.settings.min_similarity {
                    return None;
                }
                Some(ScoredChunk::new(chunk, score))
            })
            .collect();

        Ok(candidates)
    }

    fn apply_filter(
        &self,
        candidates: &[ScoredChunk],
        filter: &RetrievalFilter,
        respect_exclusions: bool,
        respect_topic: bool,
    ) -> Vec<ScoredChunk> {
        candidates
            .iter()
            .filter(|c| {
                if let Some(docs) = &filter.document_ids {
                    if !docs.contains(&c.chunk.document_id) {
                        return false;
                    }
                }
                if respect_exclusions && filter.exclude_chunk_ids.contains(&c.chunk.id) {
                    return false;
                }
                if respect_topic {
                    if let Some(topic) = &filter.topic {
                        if !c.chunk.matches_topic(topic) {
                            return false;
                        }
                    }
                }
                true
            })
            .cloned()
            .collect()
    }
}

fn scope_label(filter: &RetrievalFilter) -> String {
    match (&filter.document_ids, &filter.topic) {
        (Some(docs), Some(topic)) => {
            format!("{} document(s) with topic '{}'", docs.len(), topic)
        }
        (Some(docs), None) => format!("{} document(s)", docs.len()),
        (None, Some(topic)) => format!("topic '{}'", topic),
        (None, None) => "this session".to_string(),
    }
}
