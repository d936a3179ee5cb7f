//! Ollama generation client
//!
//! Talks to a local Ollama instance over its `/api/generate` endpoint with
//! streaming disabled, so one request maps to one completion.

use crate::llm::{GenerationClient, GenerationError, GenerationRequest, GenerationResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama API base URL.
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Request body for Ollama's `/api/generate` endpoint.
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response from Ollama's `/api/generate` endpoint.
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
}

/// Response from Ollama's `/api/tags` endpoint.
#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModelEntry>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelEntry {
    name: String,
}

/// Ollama-backed [`GenerationClient`]
pub struct OllamaClient {
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client against the default local endpoint
    pub fn new(model: impl Into<String>, timeout: Duration) -> Result<Self, GenerationError> {
        Self::with_base_url(DEFAULT_BASE_URL, model, timeout)
    }

    /// Create a client against a custom base URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check whether the service is reachable and list installed models
    pub async fn available_models(&self) -> Result<Vec<String>, GenerationError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            return Err(GenerationError::Service(format!(
                "Ollama API returned status {}",
                response.status()
            )));
        }

        let tags: OllamaTagsResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// True when the service answers at all
    pub async fn is_available(&self) -> bool {
        self.available_models().await.is_ok()
    }

    fn map_request_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            GenerationError::Service(e.to_string())
        }
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);

        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Service(format!(
                "Ollama API returned {}: {}",
                status, text
            )));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        Ok(GenerationResponse {
            text: parsed.response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let client = OllamaClient::new("llama3.1:8b", Duration::from_secs(30)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.model(), "llama3.1:8b");
    }

    #[test]
    fn test_custom_base_url() {
        let client = OllamaClient::with_base_url(
            "http://192.168.1.50:11434",
            "mistral:7b",
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://192.168.1.50:11434");
    }

    #[test]
    fn test_parse_generate_response() {
        let json = r#"{
            "model": "llama3.1:8b",
            "created_at": "2024-06-01T10:00:00Z",
            "response": "{\"question\": \"What is a chunk?\"}",
            "done": true
        }"#;

        let parsed: OllamaGenerateResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.response.contains("What is a chunk?"));
    }

    #[test]
    fn test_parse_tags_response() {
        let json = r#"{
            "models": [
                {"name": "llama3.1:8b", "size": 4661224676, "digest": "abc", "modified_at": "2024-06-01T10:00:00Z"},
                {"name": "mistral:7b", "size": 4109865159, "digest": "def", "modified_at": "2024-05-01T10:00:00Z"}
            ]
        }"#;

        let parsed: OllamaTagsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.models.len(), 2);
        assert_eq!(parsed.models[0].name, "llama3.1:8b");
    }

    #[tokio::test]
    #[ignore = "requires Ollama running locally"]
    async fn integration_generate() {
        let base_url =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());

        let client =
            OllamaClient::with_base_url(&base_url, "llama3.1:8b", Duration::from_secs(30)).unwrap();

        if !client.is_available().await {
            eprintln!("Skipping: Ollama not available at {}", base_url);
            return;
        }

        let response = client
            .generate(GenerationRequest::new(
                "Reply with the single word: ready",
                8,
                0.0,
            ))
            .await
            .unwrap();

        assert!(!response.text.is_empty());
    }
}
