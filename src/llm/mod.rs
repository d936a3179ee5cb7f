//! Generation service boundary
//!
//! The language model is an external collaborator reached through the
//! [`GenerationClient`] trait: a blocking request/response service that either
//! returns a completion or fails with a timeout/service error. The production
//! implementation talks to a local Ollama instance.

mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("generation service error: {0}")]
    Service(String),

    #[error("generation service returned unusable output: {0}")]
    Malformed(String),
}

/// A single completion request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature,
        }
    }
}

/// A completion response
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
}

/// Trait for completion backends
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run one completion to completion or failure; the implementation owns
    /// the request timeout.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// Issue a request, retrying once with backoff on timeout/service failures
pub async fn generate_with_retry(
    client: &dyn GenerationClient,
    request: GenerationRequest,
    backoff: Duration,
) -> Result<GenerationResponse, GenerationError> {
    match client.generate(request.clone()).await {
        Ok(response) => Ok(response),
        Err(e) => {
            tracing::warn!("Generation failed, retrying once: {}", e);
            tokio::time::sleep(backoff).await;
            client.generate(request).await
        }
    }
}
