use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use super::ResourceId;
use crate::domain::DomainError;

/// A chunk of resource text ranked against a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantContent {
    pub content: String,
    pub similarity: f32,
}

impl RelevantContent {
    pub fn new(content: impl Into<String>, similarity: f32) -> Self {
        Self {
            content: content.into(),
            similarity,
        }
    }
}

/// Looks up the chunks of a resource most relevant to a query.
///
/// Results are ordered by descending similarity.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContentRetriever: Send + Sync {
    async fn find_relevant_content(
        &self,
        query: &str,
        resource_id: &ResourceId,
    ) -> Result<Vec<RelevantContent>, DomainError>;
}

/// Persists resource text so it can later be retrieved
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create_resource(
        &self,
        content: &str,
        owner: Option<&str>,
    ) -> Result<ResourceId, DomainError>;
}
