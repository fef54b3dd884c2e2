//! Step planner - decomposes a user request into ordered steps

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::ModelBinding;
use crate::domain::llm::{LlmJsonSchema, LlmRequest};
use crate::domain::retry::{RetryExecutor, RetryLabel};
use crate::domain::DomainError;

const PLANNER_INSTRUCTIONS: &str = "You break user requests into a short ordered list of steps. \
Each step is one concrete action. The last step must produce the final answer for the user. \
Return an empty list when the request needs no multi-step work.";

/// Ordered step descriptions; the last entry is the final step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPlan {
    pub steps: Vec<String>,
}

impl StepPlan {
    pub fn new(steps: Vec<String>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Drops blank entries, keeps order
    fn normalized(self) -> Self {
        Self {
            steps: self
                .steps
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// Turns a raw instruction into a plan.
///
/// Planning never fails: any upstream or parse problem yields an empty plan.
#[async_trait]
pub trait StepPlanner: Send + Sync {
    async fn parse_steps(&self, raw_input: &str) -> StepPlan;
}

/// Planner backed by a structured-output model call
#[derive(Debug, Clone)]
pub struct LlmStepPlanner {
    binding: ModelBinding,
    retry: RetryExecutor,
}

impl LlmStepPlanner {
    pub fn new(binding: ModelBinding, retry: RetryExecutor) -> Self {
        Self { binding, retry }
    }

    fn schema() -> LlmJsonSchema {
        LlmJsonSchema::new(
            "workflow_steps",
            json!({
                "type": "object",
                "properties": {
                    "steps": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["steps"],
                "additionalProperties": false
            }),
        )
    }

    pub fn request(raw_input: &str) -> LlmRequest {
        LlmRequest::builder()
            .system(PLANNER_INSTRUCTIONS)
            .user(raw_input)
            .json_schema(Self::schema())
            .temperature(0.0)
            .build()
    }

    async fn plan(&self, raw_input: &str) -> Result<StepPlan, DomainError> {
        let provider = self.binding.provider.as_ref();
        let model = self.binding.model.as_str();
        let request = Self::request(raw_input);

        let response = self
            .retry
            .execute(RetryLabel::Plan, move || provider.chat(model, request.clone()))
            .await?;

        parse_plan(response.content().unwrap_or_default())
    }
}

#[async_trait]
impl StepPlanner for LlmStepPlanner {
    async fn parse_steps(&self, raw_input: &str) -> StepPlan {
        match self.plan(raw_input).await {
            Ok(plan) => {
                debug!(steps = plan.len(), "Planned workflow steps");
                plan
            }
            Err(e) => {
                warn!(error = %e, "Step planning failed, using an empty plan");
                StepPlan::default()
            }
        }
    }
}

/// Accepts `{"steps": [...]}` or a bare array, optionally inside a code fence
pub fn parse_plan(raw: &str) -> Result<StepPlan, DomainError> {
    let body = strip_code_fence(raw);

    let plan = serde_json::from_str::<StepPlan>(body)
        .or_else(|_| serde_json::from_str::<Vec<String>>(body).map(StepPlan::new))
        .map_err(|e| DomainError::validation(format!("Invalid step plan: {}", e)))?;

    Ok(plan.normalized())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
