//! Workflow domain - plan, execute and stream multi-step chat workflows

mod context;
mod error;
mod event;
mod executor;
mod orchestrator;
mod planner;
mod state;
mod turn;

pub use context::StepContext;
pub use error::WorkflowError;
pub use event::{ErrorFrame, ProgressEvent, WorkflowFrame};
pub use executor::{
    build_step_request, ModelBinding, ProviderRoute, StepExecutor, StepInput, StepMode,
    StepStreamEvent, StepTokenStream,
};
pub use orchestrator::{FrameSink, FrameStream, OrchestratorConfig, WorkflowOrchestrator};
pub use planner::{parse_plan, LlmStepPlanner, StepPlan, StepPlanner};
pub use state::{WorkflowPhase, WorkflowState};
pub use turn::{Attachment, ChatTurn};
