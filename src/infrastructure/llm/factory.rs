use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::http_client::HttpClient;
use super::{AnthropicProvider, InstrumentedProvider, OpenAiProvider};
use crate::domain::workflow::ModelBinding;
use crate::domain::{DomainError, LlmProvider};

/// Supported provider APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
}

impl LlmProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>, api_key_env: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            base_url: None,
            api_key_env: api_key_env.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Factory for creating LLM providers
#[derive(Debug)]
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Create a provider from configuration and an explicit API key
    pub fn create(
        config: &LlmProviderConfig,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn LlmProvider>, DomainError> {
        let http_client = HttpClient::with_timeout(timeout)?;

        let provider: Arc<dyn LlmProvider> = match (config.kind, &config.base_url) {
            (ProviderKind::OpenAi, Some(base_url)) => Arc::new(OpenAiProvider::with_base_url(
                http_client,
                api_key,
                base_url,
            )),
            (ProviderKind::OpenAi, None) => Arc::new(OpenAiProvider::new(http_client, api_key)),
            (ProviderKind::Anthropic, Some(base_url)) => Arc::new(
                AnthropicProvider::with_base_url(http_client, api_key, base_url),
            ),
            (ProviderKind::Anthropic, None) => {
                Arc::new(AnthropicProvider::new(http_client, api_key))
            }
        };

        Ok(provider)
    }

    /// Create a model binding, reading the API key from the configured environment variable.
    /// The provider is wrapped so every call is recorded in metrics.
    pub fn create_binding(
        config: &LlmProviderConfig,
        timeout: Duration,
    ) -> Result<ModelBinding, DomainError> {
        let api_key = Self::resolve_api_key(config)?;
        let provider = Self::create(config, &api_key, timeout)?;
        Ok(ModelBinding::new(
            Arc::new(InstrumentedProvider::new(provider)),
            config.model.clone(),
        ))
    }

    /// Create an OpenAI provider directly
    pub fn create_openai(api_key: impl Into<String>) -> Arc<dyn LlmProvider> {
        Arc::new(OpenAiProvider::new(HttpClient::new(), api_key))
    }

    /// Create an Anthropic provider directly
    pub fn create_anthropic(api_key: impl Into<String>) -> Arc<dyn LlmProvider> {
        Arc::new(AnthropicProvider::new(HttpClient::new(), api_key))
    }

    fn resolve_api_key(config: &LlmProviderConfig) -> Result<String, DomainError> {
        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(DomainError::configuration(format!(
                "Environment variable {} is not set",
                config.api_key_env
            ))),
        }
    }
}
