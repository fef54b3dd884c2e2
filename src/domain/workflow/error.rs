//! Workflow error types

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur while orchestrating a workflow
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("Step {index} ('{step}') failed: {source}")]
    StepExecution {
        index: usize,
        step: String,
        #[source]
        source: DomainError,
    },

    #[error("Invalid workflow transition: {0}")]
    InvalidTransition(String),

    #[error("Workflow cancelled: consumer disconnected")]
    Cancelled,
}

impl WorkflowError {
    pub fn step_execution(index: usize, step: impl Into<String>, source: DomainError) -> Self {
        Self::StepExecution {
            index,
            step: step.into(),
            source,
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::step_execution(
            1,
            "identify beneficiaries",
            DomainError::upstream("openai", 401, "invalid key"),
        );
        assert_eq!(
            err.to_string(),
            "Step 1 ('identify beneficiaries') failed: Provider error: openai returned HTTP 401 - invalid key"
        );

        let err = WorkflowError::invalid_transition("complete from planning");
        assert_eq!(
            err.to_string(),
            "Invalid workflow transition: complete from planning"
        );
    }

    #[test]
    fn test_cancelled() {
        assert!(WorkflowError::Cancelled.is_cancelled());
        assert!(!WorkflowError::invalid_transition("x").is_cancelled());
    }
}
