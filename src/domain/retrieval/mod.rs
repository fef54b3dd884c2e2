//! Retrieval collaborator - relevant resource content for prompt augmentation

mod provider;
mod resource;

pub use provider::{ContentRetriever, RelevantContent, ResourceStore};
pub use resource::ResourceId;

#[cfg(test)]
pub use provider::MockContentRetriever;
