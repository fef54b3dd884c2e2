//! v1 API endpoints

pub mod chat;
pub mod resources;

use axum::{routing::post, Router};

use super::state::AppState;

pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/resources", post(resources::create_resource))
}
