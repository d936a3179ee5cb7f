//! SQLite database management with migrations
//!
//! Provides structured storage for documents, chunks, and their embeddings.
//! Chunks are immutable once written: re-uploading a document inserts new
//! rows, and removal happens only when the owning document is deleted.

use crate::document::{Chunk, ChunkDraft};
use crate::error::{Result, RevuError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use uuid::Uuid;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RevuError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| RevuError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| RevuError::Config(format!("Failed to get connection: {}", e)))?;

            // WAL for concurrent readers across sessions
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| RevuError::Config(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Insert a document with all of its chunks and embeddings in one transaction
    ///
    /// Nothing becomes visible to retrieval until the transaction commits, so
    /// a document is never partially searchable. Returns the stored chunks
    /// with their assigned ids, in draft order.
    pub fn insert_document(
        &self,
        session_id: &Uuid,
        document_id: &Uuid,
        filename: &str,
        page_count: usize,
        aggregate_topics: &[String],
        drafts: &[ChunkDraft],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<Vec<Chunk>> {
        if drafts.len() != vectors.len() {
            return Err(RevuError::Session(format!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                drafts.len(),
                vectors.len()
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let now = chrono::Utc::now().timestamp();
        let topics_json = serde_json::to_string(aggregate_topics).map_err(|e| RevuError::Json {
            source: e,
            context: "Failed to serialize document topics".to_string(),
        })?;

        tx.execute(
            "INSERT INTO documents (id, session_id, filename, page_count, topics, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                document_id.to_string(),
                session_id.to_string(),
                filename,
                page_count as i64,
                topics_json,
                now,
            ],
        )?;

        let mut chunks = Vec::with_capacity(drafts.len());

        for (draft, vector) in drafts.iter().zip(vectors) {
            let chunk_topics = serde_json::to_string(&draft.topics).map_err(|e| RevuError::Json {
                source: e,
                context: "Failed to serialize chunk topics".to_string(),
            })?;

            tx.execute(
                "INSERT INTO chunks (document_id, content, page_number, topics, image_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    document_id.to_string(),
                    draft.content,
                    draft.page_number as i64,
                    chunk_topics,
                    draft.image_count as i64,
                ],
            )?;

            let chunk_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO embeddings (chunk_id, vector, model, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![chunk_id, vector_to_blob(vector), model, now],
            )?;

            chunks.push(Chunk {
                id: chunk_id,
                document_id: *document_id,
                content: draft.content.clone(),
                page_number: draft.page_number,
                topics: draft.topics.clone(),
                image_count: draft.image_count,
            });
        }

        tx.commit()?;

        Ok(chunks)
    }

    /// Fetch chunks by id
    pub fn get_chunks(&self, ids: &[i64]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, document_id, content, page_number, topics, image_count
             FROM chunks WHERE id IN ({})",
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), row_to_chunk)?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }

        Ok(chunks)
    }

    /// All chunk embeddings for a session, for rebuilding the vector index
    pub fn session_embeddings(&self, session_id: &Uuid) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT e.chunk_id, e.vector
             FROM embeddings e
             JOIN chunks c ON c.id = e.chunk_id
             JOIN documents d ON d.id = c.document_id
             WHERE d.session_id = ?1
             ORDER BY e.chunk_id",
        )?;

        let rows = stmt.query_map(params![session_id.to_string()], |row| {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob_to_vector(&blob)))
        })?;

        let mut embeddings = Vec::new();
        for row in rows {
            embeddings.push(row?);
        }

        Ok(embeddings)
    }

    /// Number of documents owned by a session
    pub fn session_document_count(&self, session_id: &Uuid) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE session_id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Number of chunks indexed for a session
    pub fn session_chunk_count(&self, session_id: &Uuid) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks c
             JOIN documents d ON d.id = c.document_id
             WHERE d.session_id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Aggregate document-level topics for a session, most recent upload first
    pub fn session_topics(&self, session_id: &Uuid) -> Result<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT topics FROM documents WHERE session_id = ?1 ORDER BY uploaded_at DESC",
        )?;

        let rows = stmt.query_map(params![session_id.to_string()], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        let mut topics: Vec<String> = Vec::new();
        for row in rows {
            let parsed: Vec<String> = serde_json::from_str(&row?).unwrap_or_default();
            for topic in parsed {
                if !topics.iter().any(|t| t.eq_ignore_ascii_case(&topic)) {
                    topics.push(topic);
                }
            }
        }

        Ok(topics)
    }

    /// Remove a document and (via cascade) its chunks and embeddings
    pub fn remove_document(&self, document_id: &Uuid) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM documents WHERE id = ?1",
            params![document_id.to_string()],
        )?;
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let document_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

        let chunk_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        let embedding_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;

        Ok(DbStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            embedding_count: embedding_count as usize,
        })
    }
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let document_id: String = row.get(1)?;
    let topics_json: String = row.get(4)?;
    let page_number: i64 = row.get(3)?;
    let image_count: i64 = row.get(5)?;

    Ok(Chunk {
        id: row.get(0)?,
        document_id: Uuid::parse_str(&document_id).unwrap_or_default(),
        content: row.get(2)?,
        page_number: page_number as usize,
        topics: serde_json::from_str(&topics_json).unwrap_or_default(),
        image_count: image_count as usize,
    })
}

/// Encode an embedding vector as little-endian f32 bytes
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode an embedding vector from little-endian f32 bytes
pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub embedding_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Documents table (one row per uploaded document, scoped to a session)
    CREATE TABLE documents (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        filename TEXT NOT NULL,
        page_count INTEGER NOT NULL,
        topics TEXT NOT NULL,
        uploaded_at INTEGER NOT NULL
    );

    CREATE INDEX idx_documents_session ON documents(session_id);

    -- Chunks table (bounded spans of document text, the retrieval unit)
    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id TEXT NOT NULL,
        content TEXT NOT NULL,
        page_number INTEGER NOT NULL,
        topics TEXT NOT NULL,
        image_count INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_chunks_document ON chunks(document_id);
    CREATE INDEX idx_chunks_page ON chunks(page_number);

    -- Embeddings table (one entry per chunk)
    CREATE TABLE embeddings (
        chunk_id INTEGER PRIMARY KEY,
        vector BLOB NOT NULL,
        model TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn draft(document_id: Uuid, content: &str, page: usize) -> ChunkDraft {
        ChunkDraft {
            document_id,
            content: content.to_string(),
            page_number: page,
            topics: vec!["testing".to_string()],
            image_count: 0,
        }
    }

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let _db = Database::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).unwrap();

        let conn = db.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_insert_and_fetch_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        let session_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        let drafts = vec![
            draft(document_id, "First chunk content.", 1),
            draft(document_id, "Second chunk content.", 2),
        ];
        let vectors = vec![vec![0.1f32; 8], vec![0.2f32; 8]];

        let chunks = db
            .insert_document(
                &session_id,
                &document_id,
                "notes.txt",
                2,
                &["testing".to_string()],
                &drafts,
                &vectors,
                "test-model",
            )
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].id < chunks[1].id);

        let fetched = db.get_chunks(&[chunks[0].id, chunks[1].id]).unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().any(|c| c.content.contains("First")));

        assert_eq!(db.session_document_count(&session_id).unwrap(), 1);
        assert_eq!(db.session_chunk_count(&session_id).unwrap(), 2);
    }

    #[test]
    fn test_chunk_vector_mismatch_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        let session_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        let drafts = vec![draft(document_id, "Only chunk.", 1)];

        let result = db.insert_document(
            &session_id,
            &document_id,
            "notes.txt",
            1,
            &[],
            &drafts,
            &[],
            "test-model",
        );

        assert!(result.is_err());
        // Nothing committed
        assert_eq!(db.session_document_count(&session_id).unwrap(), 0);
    }

    #[test]
    fn test_embedding_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        let session_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        let vector = vec![0.25f32, -0.5, 1.0, 0.0];

        db.insert_document(
            &session_id,
            &document_id,
            "notes.txt",
            1,
            &[],
            &[draft(document_id, "Content.", 1)],
            &[vector.clone()],
            "test-model",
        )
        .unwrap();

        let embeddings = db.session_embeddings(&session_id).unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].1, vector);
    }

    #[test]
    fn test_remove_document_cascades() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        let session_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        db.insert_document(
            &session_id,
            &document_id,
            "notes.txt",
            1,
            &[],
            &[draft(document_id, "Content.", 1)],
            &[vec![0.0f32; 4]],
            "test-model",
        )
        .unwrap();

        db.remove_document(&document_id).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.chunk_count, 0);
        assert_eq!(stats.embedding_count, 0);
    }

    #[test]
    fn test_session_topics_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        let session_id = Uuid::new_v4();

        for topics in [
            vec!["networks".to_string(), "training".to_string()],
            vec!["Networks".to_string(), "layers".to_string()],
        ] {
            let document_id = Uuid::new_v4();
            db.insert_document(
                &session_id,
                &document_id,
                "notes.txt",
                1,
                &topics,
                &[draft(document_id, "Content.", 1)],
                &[vec![0.0f32; 4]],
                "test-model",
            )
            .unwrap();
        }

        let topics = db.session_topics(&session_id).unwrap();
        let lowered: Vec<String> = topics.iter().map(|t| t.to_lowercase()).collect();
        assert!(lowered.contains(&"networks".to_string()));
        assert!(lowered.contains(&"training".to_string()));
        assert!(lowered.contains(&"layers".to_string()));
        assert_eq!(
            lowered.iter().filter(|t| *t == "networks").count(),
            1,
            "duplicate topics should collapse"
        );
    }

    #[test]
    fn test_vector_blob_roundtrip() {
        let vector = vec![1.5f32, -2.25, 0.0, 3.75];
        let blob = vector_to_blob(&vector);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_vector(&blob), vector);
    }
}
