//! Retrieval backend traits.
//!
//! Backends return raw hits; the orchestrator tags their origin, applies
//! timeouts, and converts every error into a `SourceReport`.

use async_trait::async_trait;

use crate::error::{BackendResult, Result};
use crate::types::retrieval::{GraphQuery, SearchHit};

/// Vector-similarity search over the knowledge store.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `k` hits, most similar first.
    async fn vector_search(&self, query_text: &str, k: usize) -> BackendResult<Vec<SearchHit>>;
}

/// Structured-graph search over the knowledge store.
///
/// Translating natural language into the store's query language is the
/// implementation's responsibility.
#[async_trait]
pub trait GraphSearch: Send + Sync {
    /// Return hits for the query, best first.
    async fn graph_search(&self, query: &GraphQuery) -> BackendResult<Vec<SearchHit>>;
}

/// Extracts known-entity ids from free text.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Return entity ids mentioned in `text`, in order of appearance.
    async fn extract_entities(&self, text: &str) -> Result<Vec<String>>;
}
