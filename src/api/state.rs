//! Application state for shared services

use std::sync::Arc;

use crate::domain::retrieval::ResourceStore;
use crate::infrastructure::services::ChatService;

/// Services shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub resource_store: Arc<dyn ResourceStore>,
}

impl AppState {
    pub fn new(chat_service: ChatService, resource_store: Arc<dyn ResourceStore>) -> Self {
        Self {
            chat_service: Arc::new(chat_service),
            resource_store,
        }
    }
}
