//! Storage layer for Revu
//!
//! Structured database access for documents, chunks, and embeddings. Session
//! state itself stays in memory; everything here is reconstructable from a
//! re-upload.

pub mod database;

use crate::error::{Result, RevuError};
use std::path::PathBuf;

pub use database::{blob_to_vector, vector_to_blob, Database, DbPool, DbStats};

/// Storage manager owning the on-disk layout
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
}

impl StorageManager {
    /// Create a new storage manager rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let store_dir = base_path.join("store");

        std::fs::create_dir_all(&store_dir).map_err(|e| RevuError::Io {
            source: e,
            context: format!("Failed to create store directory: {}", store_dir.display()),
        })?;

        let db_path = store_dir.join("db.sqlite");
        let database = Database::new(&db_path)?;

        Ok(Self {
            base_path,
            database,
        })
    }

    /// Root data directory
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(storage.base_path().join("store").exists());
        assert!(storage.base_path().join("store").join("db.sqlite").exists());
    }
}
