//! Frames emitted to the caller while a workflow runs

use serde::{Deserialize, Serialize};

/// Snapshot of workflow progress.
///
/// Every event carries the full step list so consumers can treat the latest
/// one as authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub workflow_steps: Vec<String>,
    pub current_step: usize,
    pub is_complete: bool,
}

/// Terminal failure report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

/// One unit on the outbound stream: either model output or a progress-channel frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowFrame {
    Token(String),
    Progress(ProgressEvent),
    Error(ErrorFrame),
}

impl WorkflowFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorFrame {
            error: message.into(),
        })
    }

    pub fn is_terminal_progress(&self) -> bool {
        matches!(self, Self::Progress(event) if event.is_complete)
    }
}
