//! Infrastructure services

mod chat_service;

pub use chat_service::{ChatMode, ChatService};
