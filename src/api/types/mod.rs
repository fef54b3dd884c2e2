//! Request, response and error types for the HTTP API

pub mod chat;
pub mod error;
pub mod json;

pub use chat::{
    ChatMessage, ChatRequest, CreateResourceRequest, CreateResourceResponse, FilePayload,
    RequestData,
};
pub use error::{ApiError, ApiErrorDetail, ApiErrorResponse, ApiErrorType};
pub use json::Json;
