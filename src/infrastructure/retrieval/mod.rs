//! In-process resource storage and relevance search

mod chunker;
mod in_memory;

pub use chunker::SentenceChunker;
pub use in_memory::{InMemoryResourceStore, RetrievalConfig};
