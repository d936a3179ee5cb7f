//! Configuration validation
//!
//! Checks cross-field invariants that serde cannot express on its own.

use super::Config;
use crate::error::{Result, RevuError, ValidationError};

/// Validates configuration values before the application starts
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the full configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_session(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RevuError::ConfigValidation { errors })
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let c = &config.chunking;

        if c.min_tokens == 0 {
            errors.push(ValidationError::new(
                "chunking.min_tokens",
                "must be greater than zero",
            ));
        }
        if c.min_tokens >= c.target_tokens {
            errors.push(ValidationError::new(
                "chunking.min_tokens",
                "must be smaller than target_tokens",
            ));
        }
        if c.target_tokens > c.max_tokens {
            errors.push(ValidationError::new(
                "chunking.target_tokens",
                "must not exceed max_tokens",
            ));
        }
        if c.topics_per_chunk == 0 {
            errors.push(ValidationError::new(
                "chunking.topics_per_chunk",
                "must be greater than zero",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "model name must not be empty",
            ));
        }
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "must be greater than zero",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let i = &config.indexing;

        if i.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "must be greater than zero",
            ));
        }
        if i.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "must be greater than zero",
            ));
        }
        if i.hnsw_ef_construction < i.hnsw_m {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "should be at least hnsw_m",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.retrieval;

        if r.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                "must be at least 1",
            ));
        }
        if !(-1.0..=1.0).contains(&r.min_similarity) {
            errors.push(ValidationError::new(
                "retrieval.min_similarity",
                "cosine similarity threshold must be within [-1, 1]",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let l = &config.llm;

        if l.endpoint.is_empty() {
            errors.push(ValidationError::new(
                "llm.endpoint",
                "endpoint URL must not be empty",
            ));
        }
        if l.model.is_empty() {
            errors.push(ValidationError::new(
                "llm.model",
                "model name must not be empty",
            ));
        }
        if l.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "timeout must be greater than zero",
            ));
        }
        if !(0.0..=2.0).contains(&l.temperature) {
            errors.push(ValidationError::new(
                "llm.temperature",
                "temperature must be within [0, 2]",
            ));
        }
        if !(0.0..=2.0).contains(&l.eval_temperature) {
            errors.push(ValidationError::new(
                "llm.eval_temperature",
                "temperature must be within [0, 2]",
            ));
        }
    }

    fn validate_session(config: &Config, errors: &mut Vec<ValidationError>) {
        let s = &config.session;

        if s.question_count == 0 {
            errors.push(ValidationError::new(
                "session.question_count",
                "must be at least 1",
            ));
        }
        if s.question_count > 50 {
            errors.push(ValidationError::new(
                "session.question_count",
                "must be at most 50",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_chunk_window() {
        let mut config = Config::default();
        config.chunking.min_tokens = 600;

        let result = ConfigValidator::validate(&config);
        assert!(matches!(result, Err(RevuError::ConfigValidation { .. })));
    }

    #[test]
    fn test_invalid_question_count() {
        let mut config = Config::default();
        config.session.question_count = 0;

        assert!(ConfigValidator::validate(&config).is_err());

        config.session.question_count = 51;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_timeout() {
        let mut config = Config::default();
        config.llm.timeout_secs = 0;

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = Config::default();
        config.llm.model = String::new();
        config.session.question_count = 0;

        match ConfigValidator::validate(&config) {
            Err(RevuError::ConfigValidation { errors }) => {
                assert!(errors.len() >= 2);
            }
            other => panic!("expected validation failure, got {:?}", other.is_ok()),
        }
    }
}
