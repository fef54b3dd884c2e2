//! Provider decorator recording request metrics

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::llm::{LlmRequest, LlmResponse, LlmStream};
use crate::domain::{DomainError, LlmProvider};
use crate::infrastructure::observability::{record_llm_request, LlmRequestMetricParams};

/// Wraps a provider and records `llm_requests_total` and
/// `llm_request_duration_seconds` for every call, plus `llm_tokens_total`
/// when a completed reply reports usage. For streams only the open is timed.
#[derive(Debug, Clone)]
pub struct InstrumentedProvider {
    inner: Arc<dyn LlmProvider>,
}

impl InstrumentedProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        Self { inner }
    }

    fn record<T>(&self, model: &str, operation: &str, started: Instant, result: &Result<T, DomainError>) {
        record_llm_request(LlmRequestMetricParams {
            provider: self.inner.provider_name(),
            model,
            operation,
            duration: started.elapsed(),
            success: result.is_ok(),
            upstream_status: result.as_ref().err().and_then(DomainError::status_code),
        });
    }
}

#[async_trait]
impl LlmProvider for InstrumentedProvider {
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        let started = Instant::now();
        let result = self.inner.chat(model, request).await;
        self.record(model, "chat", started, &result);

        if let Some(usage) = result.as_ref().ok().and_then(|r| r.usage) {
            let provider = self.inner.provider_name();
            counter!("llm_tokens_total", "provider" => provider, "kind" => "prompt")
                .increment(u64::from(usage.prompt_tokens));
            counter!("llm_tokens_total", "provider" => provider, "kind" => "completion")
                .increment(u64::from(usage.completion_tokens));
        }

        result
    }

    async fn chat_stream(&self, model: &str, request: LlmRequest) -> Result<LlmStream, DomainError> {
        let started = Instant::now();
        let result = self.inner.chat_stream(model, request).await;
        self.record(model, "stream", started, &result);
        result
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
