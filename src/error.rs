use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Revu application
#[derive(Error, Debug)]
pub enum RevuError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Session related errors
    #[error("Session error: {0}")]
    Session(String),

    /// Session not found
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    /// Document parsing errors (document rejected, session unaffected)
    #[error("Document parse error: {0}")]
    Parse(#[from] crate::document::ParseError),

    /// Embedding errors (ingestion aborted for the affected document)
    #[error("Embedding error: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingError),

    /// Vector index errors
    #[error("Vector index error: {0}")]
    Index(#[from] crate::embedding::VectorIndexError),

    /// Retrieval errors, including an empty candidate scope
    #[error("Search error: {0}")]
    Search(#[from] crate::retrieval::SearchError),

    /// Generation service errors (timeout, unavailable, malformed output)
    #[error("Generation error: {0}")]
    Generation(#[from] crate::llm::GenerationError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Revu operations
pub type Result<T> = std::result::Result<T, RevuError>;
