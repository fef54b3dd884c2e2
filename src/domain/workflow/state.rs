//! Workflow state machine

use serde::Serialize;

use super::{ProgressEvent, StepContext, WorkflowError};

/// Lifecycle phase of a single workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "step", rename_all = "snake_case")]
pub enum WorkflowPhase {
    Planning,
    /// Running intermediate step `i`, where `i <= total_steps - 2`
    Executing(usize),
    FinalExecuting,
    Complete,
    Errored,
}

impl WorkflowPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }
}

/// Mutable state of one workflow run.
///
/// The step list is fixed once planning completes. The context only grows, and
/// only intermediate results are appended to it: after step `i` completes the
/// context holds exactly `i + 1` entries, and the final step's output is never
/// recorded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    steps: Vec<String>,
    current_step_index: usize,
    context: StepContext,
    phase: WorkflowPhase,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowState {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            current_step_index: 0,
            context: StepContext::new(),
            phase: WorkflowPhase::Planning,
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn current_step(&self) -> Option<&str> {
        match self.phase {
            WorkflowPhase::Executing(_) | WorkflowPhase::FinalExecuting => {
                self.steps.get(self.current_step_index).map(String::as_str)
            }
            _ => None,
        }
    }

    pub fn context(&self) -> &StepContext {
        &self.context
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == WorkflowPhase::Complete
    }

    /// Installs the plan and leaves `Planning`.
    ///
    /// An empty plan completes the workflow immediately; a single-step plan
    /// goes straight to the final step.
    pub fn plan(&mut self, steps: Vec<String>) -> Result<(), WorkflowError> {
        if self.phase != WorkflowPhase::Planning {
            return Err(WorkflowError::invalid_transition(format!(
                "cannot plan from {:?}",
                self.phase
            )));
        }

        self.steps = steps;
        self.current_step_index = 0;
        self.phase = match self.steps.len() {
            0 => WorkflowPhase::Complete,
            1 => WorkflowPhase::FinalExecuting,
            _ => WorkflowPhase::Executing(0),
        };

        Ok(())
    }

    /// Records the result of the current intermediate step and advances
    pub fn record_step_result(&mut self, result: impl Into<String>) -> Result<(), WorkflowError> {
        let WorkflowPhase::Executing(index) = self.phase else {
            return Err(WorkflowError::invalid_transition(format!(
                "cannot record a step result from {:?}",
                self.phase
            )));
        };

        self.context.append(result);
        self.current_step_index = index + 1;
        self.phase = if self.current_step_index == self.steps.len() - 1 {
            WorkflowPhase::FinalExecuting
        } else {
            WorkflowPhase::Executing(self.current_step_index)
        };

        Ok(())
    }

    /// Marks the final step's stream as fully drained
    pub fn complete(&mut self) -> Result<(), WorkflowError> {
        if self.phase != WorkflowPhase::FinalExecuting {
            return Err(WorkflowError::invalid_transition(format!(
                "cannot complete from {:?}",
                self.phase
            )));
        }

        self.phase = WorkflowPhase::Complete;
        Ok(())
    }

    /// Moves a running workflow to `Errored`. Terminal phases are left as they are.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = WorkflowPhase::Errored;
        }
    }

    /// Snapshot suitable for the progress channel
    pub fn progress(&self) -> ProgressEvent {
        ProgressEvent {
            workflow_steps: self.steps.clone(),
            current_step: self.current_step_index,
            is_complete: self.is_complete(),
        }
    }
}
