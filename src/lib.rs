//! PMP Workflow Chat
//!
//! Answers chat requests either directly or by planning an ordered list of
//! steps, running them one after another with accumulated context and
//! streaming the final step's tokens together with live progress.
//!
//! - Provider calls are retried with bounded exponential backoff
//! - Attachments route to a document-capable provider
//! - Uploaded resources feed relevant content into step prompts

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use api::state::AppState;
use domain::retry::RetryExecutor;
use domain::workflow::{LlmStepPlanner, StepExecutor, WorkflowOrchestrator};
use infrastructure::llm::LlmProviderFactory;
use infrastructure::retrieval::InMemoryResourceStore;
use infrastructure::services::ChatService;

/// Create the step planner bound to the text provider
pub fn create_planner(config: &AppConfig) -> anyhow::Result<LlmStepPlanner> {
    let timeout = Duration::from_secs(config.providers.request_timeout_secs);
    let binding = LlmProviderFactory::create_binding(&config.providers.text, timeout)?;

    Ok(LlmStepPlanner::new(
        binding,
        RetryExecutor::new(config.retry.clone()),
    ))
}

/// Create the application state with custom configuration
pub fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let timeout = Duration::from_secs(config.providers.request_timeout_secs);
    let retry = RetryExecutor::new(config.retry.clone());

    let text = LlmProviderFactory::create_binding(&config.providers.text, timeout)?;
    let document = LlmProviderFactory::create_binding(&config.providers.document, timeout)?;
    info!(
        text_provider = text.provider.provider_name(),
        text_model = %text.model,
        document_provider = document.provider.provider_name(),
        document_model = %document.model,
        "Model bindings configured"
    );

    let resource_store = Arc::new(InMemoryResourceStore::new(
        config.workflow.retrieval.clone(),
    ));

    let planner = LlmStepPlanner::new(text.clone(), retry.clone());
    let executor = StepExecutor::new(text, document, retry).with_retriever(resource_store.clone());
    let orchestrator = WorkflowOrchestrator::new(
        Arc::new(planner),
        Arc::new(executor),
        config.workflow.orchestrator(),
    );

    Ok(AppState::new(ChatService::new(orchestrator), resource_store))
}
