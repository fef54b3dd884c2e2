//! In-memory resource store with term-overlap relevance search

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use super::SentenceChunker;
use crate::domain::retrieval::{ContentRetriever, RelevantContent, ResourceId, ResourceStore};
use crate::domain::DomainError;

/// Search tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum number of chunks returned per query
    pub top_k: usize,
    /// Chunks scoring below this are discarded
    pub min_similarity: f32,
    pub chunk_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_similarity: 0.1,
            chunk_size: 500,
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    content: String,
    terms: HashMap<String, f32>,
}

#[derive(Debug, Clone)]
struct StoredResource {
    owner: Option<String>,
    chunks: Vec<IndexedChunk>,
}

/// Keeps resources in memory for the lifetime of the process
#[derive(Debug)]
pub struct InMemoryResourceStore {
    resources: Arc<RwLock<HashMap<ResourceId, StoredResource>>>,
    chunker: SentenceChunker,
    config: RetrievalConfig,
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new(RetrievalConfig::default())
    }
}

impl InMemoryResourceStore {
    pub fn new(config: RetrievalConfig) -> Self {
        Self {
            resources: Arc::new(RwLock::new(HashMap::new())),
            chunker: SentenceChunker::new(config.chunk_size),
            config,
        }
    }

    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }

    pub async fn owner(&self, id: &ResourceId) -> Option<String> {
        self.resources
            .read()
            .await
            .get(id)
            .and_then(|r| r.owner.clone())
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn create_resource(
        &self,
        content: &str,
        owner: Option<&str>,
    ) -> Result<ResourceId, DomainError> {
        if content.trim().is_empty() {
            return Err(DomainError::validation("Resource content cannot be empty"));
        }

        let chunks: Vec<IndexedChunk> = self
            .chunker
            .chunk(content)
            .into_iter()
            .map(|content| IndexedChunk {
                terms: term_frequencies(&content),
                content,
            })
            .collect();

        let id = ResourceId::generate();
        debug!(resource_id = %id, chunks = chunks.len(), "Stored resource");

        self.resources.write().await.insert(
            id.clone(),
            StoredResource {
                owner: owner.map(str::to_string),
                chunks,
            },
        );

        Ok(id)
    }
}

#[async_trait]
impl ContentRetriever for InMemoryResourceStore {
    async fn find_relevant_content(
        &self,
        query: &str,
        resource_id: &ResourceId,
    ) -> Result<Vec<RelevantContent>, DomainError> {
        let resources = self.resources.read().await;
        let resource = resources
            .get(resource_id)
            .ok_or_else(|| DomainError::not_found(format!("Resource '{}' not found", resource_id)))?;

        let query_terms = term_frequencies(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<RelevantContent> = resource
            .chunks
            .iter()
            .map(|chunk| RelevantContent::new(&chunk.content, cosine(&query_terms, &chunk.terms)))
            .filter(|r| r.similarity >= self.config.min_similarity)
            .collect();

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(self.config.top_k);

        Ok(results)
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut terms = HashMap::new();
    for word in text.unicode_words() {
        *terms.entry(word.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

fn cosine(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    let dot: f32 = a
        .iter()
        .filter_map(|(term, weight)| b.get(term).map(|other| weight * other))
        .sum();

    if dot == 0.0 {
        return 0.0;
    }

    let norm = |v: &HashMap<String, f32>| v.values().map(|w| w * w).sum::<f32>().sqrt();
    dot / (norm(a) * norm(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WILL: &str = "The house on Elm Street goes to Anna. \
        The vintage car goes to Ben. \
        Savings are split equally between both children.";

    fn store() -> InMemoryResourceStore {
        InMemoryResourceStore::new(RetrievalConfig {
            top_k: 2,
            min_similarity: 0.1,
            chunk_size: 40,
        })
    }

    #[tokio::test]
    async fn test_create_and_search() {
        let store = store();
        let id = store.create_resource(WILL, Some("user-1")).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.owner(&id).await.as_deref(), Some("user-1"));

        let results = store
            .find_relevant_content("who gets the car", &id)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert!(results[0].content.contains("car"));
        assert!(results.len() <= 2);
        assert!(results
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn test_unrelated_query_returns_nothing() {
        let store = store();
        let id = store.create_resource(WILL, None).await.unwrap();

        let results = store
            .find_relevant_content("quantum chromodynamics", &id)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let store = store();
        let id = ResourceId::new("missing").unwrap();

        let err = store.find_relevant_content("car", &id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let store = store();
        assert!(store.create_resource("  ", None).await.is_err());
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_cosine_identical_and_disjoint() {
        let a = term_frequencies("estate plan");
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-6);

        let b = term_frequencies("weather report");
        assert_eq!(cosine(&a, &b), 0.0);
    }
}
