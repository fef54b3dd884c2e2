//! Chat endpoint streaming tokens and workflow progress as server-sent events

use std::convert::Infallible;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info};

use crate::api::middleware::truncate_for_log;
use crate::api::state::AppState;
use crate::api::types::{ApiError, ChatRequest, Json};
use crate::domain::workflow::WorkflowFrame;

/// POST /v1/chat
///
/// Validation errors are returned synchronously as JSON. Once the request is
/// accepted the response is `text/event-stream` with `token`, `progress` and
/// `error` events, ending when the run ends.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let (mode, turn) = request.into_turn()?;

    info!(
        mode = ?mode,
        messages = turn.messages.len(),
        has_file = turn.has_attachment(),
        resource_id = ?turn.resource_id.as_ref().map(|id| id.as_str()),
        "Processing chat request"
    );
    if let Some(input) = turn.latest_user_input() {
        debug!(input = %truncate_for_log(input, 200), "Latest user input");
    }

    let events = state
        .chat_service
        .respond(mode, turn)
        .map(|frame| Ok::<_, Infallible>(frame_event(frame)));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn frame_event(frame: WorkflowFrame) -> Event {
    match frame {
        WorkflowFrame::Token(text) => Event::default().event("token").data(text),
        WorkflowFrame::Progress(progress) => json_event("progress", &progress),
        WorkflowFrame::Error(error) => json_event("error", &error),
    }
}

fn json_event<T: Serialize>(name: &str, value: &T) -> Event {
    match serde_json::to_string(value) {
        Ok(data) => Event::default().event(name).data(data),
        Err(e) => Event::default().event("error").data(
            serde_json::json!({ "error": format!("Failed to encode {} frame: {}", name, e) })
                .to_string(),
        ),
    }
}
