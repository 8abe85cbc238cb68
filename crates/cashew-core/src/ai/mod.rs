//! Pluggable AI backend abstraction for remote classification
//!
//! # Architecture
//!
//! - `AIBackend` trait: the interface every backend implements
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//!
//! Backends only transport a batch and return the raw assignments; checking
//! answers against the category set happens in [`crate::remote`].
//!
//! # Configuration
//!
//! Built from the `[classifier]` config section. Environment variables
//! override the file:
//! - `AI_BACKEND`: Backend to use (openai_compatible, mock, none)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL
//! - `OPENAI_COMPATIBLE_MODEL`: Model name
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required

mod mock;
mod openai_compatible;
pub mod parsing;
pub mod prompt;
pub mod types;

pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{ClassifierConfig, DEFAULT_OPENAI_HOST};
use crate::error::{Error, Result};
use crate::models::CategorySet;

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Classify one batch
    ///
    /// Returns the service's entries unvalidated; they may be fewer, carry
    /// unknown categories or the "unknown" sentinel.
    async fn classify_batch(
        &self,
        items: &[ClassificationItem],
        categories: &CategorySet,
    ) -> Result<Vec<CategoryAssignment>>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible backend (OpenAI, vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from the classifier configuration
    ///
    /// Returns `None` when remote classification is disabled: backend
    /// `none`, or an OpenAI-compatible backend without host or API key.
    pub fn from_config(config: &ClassifierConfig) -> Result<Option<Self>> {
        match config.backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                let host = match (&config.host, &config.api_key) {
                    (Some(host), _) => host.clone(),
                    (None, Some(_)) => DEFAULT_OPENAI_HOST.to_string(),
                    (None, None) => {
                        info!("No classifier host or API key configured, remote classification disabled");
                        return Ok(None);
                    }
                };
                let backend = match &config.api_key {
                    Some(key) => OpenAICompatibleBackend::with_api_key(&host, &config.model, key),
                    None => OpenAICompatibleBackend::new(&host, &config.model),
                }
                .with_timeout(Duration::from_secs(config.timeout_secs))?;
                Ok(Some(AIClient::OpenAICompatible(backend)))
            }
            "mock" => Ok(Some(AIClient::Mock(MockBackend::new()))),
            "none" | "" => Ok(None),
            other => Err(Error::Config(format!("Unknown classifier backend: {}", other))),
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn classify_batch(
        &self,
        items: &[ClassificationItem],
        categories: &CategorySet,
    ) -> Result<Vec<CategoryAssignment>> {
        match self {
            AIClient::OpenAICompatible(b) => b.classify_batch(items, categories).await,
            AIClient::Mock(b) => b.classify_batch(items, categories).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(backend: &str, host: Option<&str>, api_key: Option<&str>) -> ClassifierConfig {
        ClassifierConfig {
            backend: backend.to_string(),
            host: host.map(str::to_string),
            api_key: api_key.map(str::to_string),
            ..ClassifierConfig::default()
        }
    }

    #[test]
    fn test_from_config_openai_with_host() {
        let client = AIClient::from_config(&classifier("openai_compatible", Some("http://localhost:8080/"), None))
            .unwrap()
            .unwrap();
        assert!(matches!(client, AIClient::OpenAICompatible(_)));
        assert_eq!(client.host(), "http://localhost:8080");
    }

    #[test]
    fn test_from_config_api_key_defaults_to_openai() {
        let client = AIClient::from_config(&classifier("openai", None, Some("sk-test")))
            .unwrap()
            .unwrap();
        assert_eq!(client.host(), DEFAULT_OPENAI_HOST);
    }

    #[test]
    fn test_from_config_disabled() {
        assert!(AIClient::from_config(&classifier("openai_compatible", None, None))
            .unwrap()
            .is_none());
        assert!(AIClient::from_config(&classifier("none", Some("http://x"), None))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_from_config_mock_and_unknown() {
        let client = AIClient::from_config(&classifier("MOCK", None, None))
            .unwrap()
            .unwrap();
        assert_eq!(client.model(), "mock");
        assert!(AIClient::from_config(&classifier("ollama", None, None)).is_err());
    }
}
