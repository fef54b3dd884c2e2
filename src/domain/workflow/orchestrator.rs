//! Workflow orchestrator - drives plan, intermediate steps and the streamed final step

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, Instrument};

use super::{
    ChatTurn, ProgressEvent, StepExecutor, StepInput, StepPlanner, StepStreamEvent,
    WorkflowError, WorkflowFrame, WorkflowPhase, WorkflowState,
};
use crate::domain::DomainError;

/// Outbound frames of one request
pub type FrameStream = Pin<Box<dyn Stream<Item = WorkflowFrame> + Send>>;

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Emit progress frames alongside the token stream
    pub progress_channel: bool,

    /// Bound of the outbound frame buffer
    pub channel_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            progress_channel: true,
            channel_capacity: 64,
        }
    }
}

/// Writing half of a request's frame stream.
///
/// A failed send means the consumer went away and surfaces as
/// [`WorkflowError::Cancelled`].
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<WorkflowFrame>,
    progress_enabled: bool,
}

impl FrameSink {
    pub fn new(tx: mpsc::Sender<WorkflowFrame>, progress_enabled: bool) -> Self {
        Self {
            tx,
            progress_enabled,
        }
    }

    /// Paired sink and stream with the given buffer size
    pub fn channel(capacity: usize, progress_enabled: bool) -> (Self, FrameStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, progress_enabled), Box::pin(ReceiverStream::new(rx)))
    }

    async fn send(&self, frame: WorkflowFrame) -> Result<(), WorkflowError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| WorkflowError::Cancelled)
    }

    pub async fn token(&self, text: String) -> Result<(), WorkflowError> {
        self.send(WorkflowFrame::Token(text)).await
    }

    pub async fn progress(&self, event: ProgressEvent) -> Result<(), WorkflowError> {
        if !self.progress_enabled {
            return Ok(());
        }
        self.send(WorkflowFrame::Progress(event)).await
    }

    /// Best effort; the consumer may already be gone
    pub async fn error(&self, message: impl Into<String>) {
        let _ = self.tx.send(WorkflowFrame::error(message)).await;
    }

    /// Races `fut` against consumer disconnect
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, WorkflowError> {
        tokio::select! {
            biased;
            _ = self.tx.closed() => Err(WorkflowError::Cancelled),
            output = fut => Ok(output),
        }
    }
}

/// Runs one workflow per request.
///
/// Steps execute strictly in plan order; the outputs of steps `0..k-1` are
/// accumulated and fed to every later step, and only the last step is streamed
/// to the caller. Any step failure ends the run with a single error frame.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    planner: Arc<dyn StepPlanner>,
    executor: Arc<StepExecutor>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("executor", &self.executor)
            .field("config", &self.config)
            .finish()
    }
}

impl WorkflowOrchestrator {
    pub fn new(
        planner: Arc<dyn StepPlanner>,
        executor: Arc<StepExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            planner,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn planner(&self) -> &Arc<dyn StepPlanner> {
        &self.planner
    }

    pub fn executor(&self) -> &Arc<StepExecutor> {
        &self.executor
    }

    /// Start the workflow in the background and return its frame stream.
    ///
    /// Dropping the stream cancels the run at its next suspension point.
    pub fn run(&self, turn: ChatTurn) -> FrameStream {
        let (sink, frames) =
            FrameSink::channel(self.config.channel_capacity, self.config.progress_channel);
        let orchestrator = self.clone();
        let span = tracing::info_span!("workflow", run_id = %uuid::Uuid::new_v4());

        tokio::spawn(
            async move {
                orchestrator.drive(turn, &sink).await;
            }
            .instrument(span),
        );

        frames
    }

    /// Run the state machine to a terminal phase, writing frames to `sink`
    pub async fn drive(&self, turn: ChatTurn, sink: &FrameSink) -> WorkflowState {
        let started = Instant::now();
        let mut state = WorkflowState::new();

        let outcome = match self.advance(&mut state, &turn, sink).await {
            Ok(()) => "complete",
            Err(WorkflowError::Cancelled) => {
                state.fail();
                info!(
                    step = state.current_step_index(),
                    "Consumer disconnected, workflow cancelled"
                );
                "cancelled"
            }
            Err(e) => {
                state.fail();
                error!(
                    step = state.current_step_index(),
                    total_steps = state.total_steps(),
                    error = %e,
                    "Workflow failed"
                );
                sink.error(e.to_string()).await;
                "errored"
            }
        };

        counter!("workflow_runs_total", "outcome" => outcome).increment(1);
        histogram!("workflow_duration_seconds", "outcome" => outcome)
            .record(started.elapsed().as_secs_f64());

        state
    }

    async fn advance(
        &self,
        state: &mut WorkflowState,
        turn: &ChatTurn,
        sink: &FrameSink,
    ) -> Result<(), WorkflowError> {
        let raw_input = turn.latest_user_input().unwrap_or_default();
        let plan = sink.guard(self.planner.parse_steps(raw_input)).await?;
        state.plan(plan.steps)?;

        info!(total_steps = state.total_steps(), "Workflow planned");
        sink.progress(state.progress()).await?;

        if state.is_complete() {
            return Ok(());
        }

        while let WorkflowPhase::Executing(index) = state.phase() {
            let description = state.steps()[index].clone();
            debug!(step = index, description = %description, "Running intermediate step");

            let input = StepInput {
                index,
                description: &description,
                context: state.context(),
                turn,
            };
            let result = sink
                .guard(self.executor.complete_step(input))
                .await?
                .map_err(|e| WorkflowError::step_execution(index, &description, e))?;

            state.record_step_result(result)?;
            sink.progress(state.progress()).await?;
        }

        self.stream_final_step(state, turn, sink).await
    }

    async fn stream_final_step(
        &self,
        state: &mut WorkflowState,
        turn: &ChatTurn,
        sink: &FrameSink,
    ) -> Result<(), WorkflowError> {
        let index = state.current_step_index();
        let description = state.current_step().unwrap_or_default().to_string();
        debug!(step = index, description = %description, "Running final step");

        let input = StepInput {
            index,
            description: &description,
            context: state.context(),
            turn,
        };
        let mut stream = sink
            .guard(self.executor.stream_step(input))
            .await?
            .map_err(|e| WorkflowError::step_execution(index, &description, e))?;

        loop {
            match sink.guard(stream.next()).await? {
                Some(Ok(StepStreamEvent::Token(text))) => sink.token(text).await?,
                Some(Ok(StepStreamEvent::Finished)) => {
                    state.complete()?;
                    info!(total_steps = state.total_steps(), "Workflow complete");
                    return sink.progress(state.progress()).await;
                }
                Some(Err(e)) => {
                    return Err(WorkflowError::step_execution(index, &description, e));
                }
                None => {
                    return Err(WorkflowError::step_execution(
                        index,
                        &description,
                        DomainError::internal("Stream ended without completing"),
                    ));
                }
            }
        }
    }
}
