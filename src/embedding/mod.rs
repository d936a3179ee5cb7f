//! Embedding generation and vector indexing
//!
//! Architecture:
//! - EmbeddingProvider trait for abstraction over embedding backends
//! - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
//! - HNSW for cosine-similarity nearest-neighbor search
//!
//! Each session owns its own [`VectorIndex`] partition; the index is a
//! capability handed to the session, never process-global state.

mod provider;
mod vector_index;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{SearchResult, VectorIndex, VectorIndexError};
