//! HNSW vector index for similarity search

use hnsw_rs::prelude::*;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Search result with chunk id and similarity score
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Chunk id the vector belongs to
    pub id: i64,
    /// Cosine similarity score (higher is more relevant)
    pub score: f32,
}

/// HNSW vector index wrapper
///
/// Provides approximate nearest neighbor search over chunk embeddings using
/// cosine similarity. One instance per session partition.
pub struct VectorIndex {
    index: Arc<RwLock<Hnsw<'static, f32, DistCosine>>>,
    dimension: usize,
    ef_construction: usize,
    m: usize,
    count: Arc<RwLock<u64>>,
}

impl VectorIndex {
    /// Create a new vector index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `ef_construction` - HNSW construction parameter (higher = better recall, slower build)
    /// * `m` - HNSW M parameter (number of connections per layer)
    pub fn new(dimension: usize, ef_construction: usize, m: usize) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            m,
            dimension,
            ef_construction,
            200, // max_nb_connection
            DistCosine,
        );

        Self {
            index: Arc::new(RwLock::new(index)),
            dimension,
            ef_construction,
            m,
            count: Arc::new(RwLock::new(0)),
        }
    }

    /// Insert a chunk embedding into the index
    pub fn insert(&self, id: i64, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let data = vector.to_vec();

        #[allow(unused_mut)]
        let mut index = self
            .index
            .write()
            .map_err(|e| VectorIndexError::InsertError(e.to_string()))?;
        index.insert((&data, id as usize));

        let mut count = self
            .count
            .write()
            .map_err(|e| VectorIndexError::InsertError(e.to_string()))?;
        *count += 1;

        Ok(())
    }

    /// Insert multiple embeddings in batch
    pub fn insert_batch(&self, items: &[(i64, Vec<f32>)]) -> Result<(), VectorIndexError> {
        for (id, vector) in items {
            self.insert(*id, vector)?;
        }
        Ok(())
    }

    /// Search for k nearest neighbors
    ///
    /// # Returns
    /// (id, similarity_score) pairs, sorted by score descending. Scores are
    /// cosine similarities; downstream tie-breaking on page/chunk id is the
    /// retriever's responsibility.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let index = self
            .index
            .read()
            .map_err(|e| VectorIndexError::SearchError(e.to_string()))?;

        let results = index.search(query, k, ef_search);

        let search_results = results
            .into_iter()
            .map(|neighbor| SearchResult {
                id: neighbor.d_id as i64,
                score: 1.0 - neighbor.distance, // DistCosine reports 1 - cos
            })
            .collect();

        Ok(search_results)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> u64 {
        self.count.read().map(|c| *c).unwrap_or(0)
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Clear the index (remove all vectors)
    pub fn clear(&self) -> Result<(), VectorIndexError> {
        let mut index = self
            .index
            .write()
            .map_err(|e| VectorIndexError::InsertError(e.to_string()))?;
        *index = Hnsw::<f32, DistCosine>::new(
            self.m,
            self.dimension,
            self.ef_construction,
            200,
            DistCosine,
        );

        let mut count = self
            .count
            .write()
            .map_err(|e| VectorIndexError::InsertError(e.to_string()))?;
        *count = 0;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_creation() {
        let index = VectorIndex::new(384, 200, 16);
        assert_eq!(index.dimension(), 384);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new(384, 200, 16);

        let mut vec1 = vec![0.0; 384];
        vec1[0] = 1.0;

        let mut vec2 = vec![0.0; 384];
        vec2[1] = 1.0;

        let mut vec3 = vec![0.0; 384];
        vec3[0] = 0.9;
        vec3[1] = 0.1;

        index.insert(1, &vec1).unwrap();
        index.insert(2, &vec2).unwrap();
        index.insert(3, &vec3).unwrap();

        assert_eq!(index.len(), 3);

        let results = index.search(&vec1, 2, 50).unwrap();
        assert_eq!(results.len(), 2);

        // Closest matches should be vec1 itself and vec3
        assert!(results[0].id == 1 || results[0].id == 3);
        assert!(results[0].score > 0.8);
    }

    #[test]
    fn test_batch_insert() {
        let index = VectorIndex::new(8, 200, 16);

        let items: Vec<(i64, Vec<f32>)> = (0..10).map(|i| (i, vec![(i + 1) as f32; 8])).collect();

        index.insert_batch(&items).unwrap();
        assert_eq!(index.len(), 10);
    }

    #[test]
    fn test_dimension_validation() {
        let index = VectorIndex::new(384, 200, 16);

        let vec = vec![1.0; 128];
        let result = index.insert(1, &vec);
        assert!(result.is_err());

        let result = index.search(&vec, 5, 50);
        assert!(result.is_err());
    }

    #[test]
    fn test_clear() {
        let index = VectorIndex::new(8, 200, 16);
        index.insert(1, &vec![1.0; 8]).unwrap();
        assert_eq!(index.len(), 1);

        index.clear().unwrap();
        assert!(index.is_empty());
    }
}
