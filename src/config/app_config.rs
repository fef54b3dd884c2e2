use serde::Deserialize;

use crate::domain::retry::RetryPolicy;
use crate::domain::workflow::OrchestratorConfig;
use crate::infrastructure::llm::{LlmProviderConfig, ProviderKind};
use crate::infrastructure::observability::ObservabilityConfig;
use crate::infrastructure::retrieval::RetrievalConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Model bindings used by the step executor and planner
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// Serves text-only turns and planning
    pub text: LlmProviderConfig,
    /// Serves turns that carry an attachment
    pub document: LlmProviderConfig,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub progress_channel: bool,
    pub channel_capacity: usize,
    pub retrieval: RetrievalConfig,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            text: LlmProviderConfig::new(ProviderKind::OpenAi, "gpt-4o-mini", "OPENAI_API_KEY"),
            document: LlmProviderConfig::new(
                ProviderKind::Anthropic,
                "claude-3-5-sonnet-20241022",
                "ANTHROPIC_API_KEY",
            ),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        Self {
            progress_channel: orchestrator.progress_channel,
            channel_capacity: orchestrator.channel_capacity,
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            progress_channel: self.progress_channel,
            channel_capacity: self.channel_capacity,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
