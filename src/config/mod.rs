//! Configuration management for Revu
//!
//! Handles loading, validation, and management of the TOML configuration,
//! including environment variable overrides for deployment-specific values.

use crate::error::{Result, RevuError};
use crate::quiz::{Difficulty, QuestionType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub session: SessionDefaults,
    pub speech: SpeechConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Chunking configuration
///
/// Sizes are approximate token counts (whitespace-delimited words).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Minimum chunk size before an early flush is allowed
    pub min_tokens: usize,
    /// Target chunk size the merger aims for
    pub target_tokens: usize,
    /// Hard upper bound; oversized sentences are split at word boundaries
    pub max_tokens: usize,
    /// Number of topic tags attached to each chunk
    pub topics_per_chunk: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Batch size for embedding document chunks
    pub batch_size: usize,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Vector dimension (must match embedding dimension)
    pub vector_dim: usize,
    /// HNSW construction parameter (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// HNSW M parameter (number of connections per layer)
    pub hnsw_m: usize,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched per requested result before filtering
    pub search_multiplier: usize,
    /// Floor on the candidate pool so filters have material to work with
    pub min_candidate_pool: usize,
    /// HNSW search parameter (higher = better recall, slower search)
    pub hnsw_ef_search: usize,
    /// Results below this cosine similarity are discarded (0.0 disables)
    pub min_similarity: f32,
}

/// Generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the Ollama-compatible endpoint
    pub endpoint: String,
    /// Model name to request
    pub model: String,
    /// Sampling temperature for question generation
    pub temperature: f32,
    /// Sampling temperature for answer evaluation (low for consistency)
    pub eval_temperature: f32,
    /// Maximum tokens per completion
    pub max_tokens: u32,
    /// Request timeout; a hang becomes a reportable timeout error
    pub timeout_secs: u64,
    /// Backoff before the single automatic retry
    pub retry_backoff_ms: u64,
}

/// Default session configuration applied to new sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    pub question_count: u32,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
}

/// Speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Whether replies are also synthesized to audio when a backend is wired
    pub enabled: bool,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RevuError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RevuError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RevuError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: REVU_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("REVU_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__ENDPOINT" => {
                self.llm.endpoint = value.to_string();
            }
            "LLM__MODEL" => {
                self.llm.model = value.to_string();
            }
            "LLM__TIMEOUT_SECS" => {
                self.llm.timeout_secs =
                    value.parse().map_err(|_| RevuError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RevuError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("revu").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| RevuError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".revu"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.revu"),
            },
            chunking: ChunkingConfig {
                min_tokens: 40,
                target_tokens: 300,
                max_tokens: 500,
                topics_per_chunk: 5,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            indexing: IndexingConfig {
                vector_dim: 384,
                hnsw_ef_construction: 200,
                hnsw_m: 16,
            },
            retrieval: RetrievalConfig {
                search_multiplier: 10,
                min_candidate_pool: 128,
                hnsw_ef_search: 64,
                min_similarity: 0.0,
            },
            llm: LlmConfig {
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.1:8b".to_string(),
                temperature: 0.7,
                eval_temperature: 0.1,
                max_tokens: 1024,
                timeout_secs: 30,
                retry_backoff_ms: 500,
            },
            session: SessionDefaults {
                question_count: 5,
                question_type: QuestionType::MultipleChoice,
                difficulty: Difficulty::Medium,
            },
            speech: SpeechConfig { enabled: false },
        }
    }
}
