//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the routing and
//! retrieval library without real backends, embedding services, or LLMs.
//! Every mock is cheap to clone; clones share configuration and call logs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{BackendError, BackendResult, RagError, Result};
use crate::traits::{
    backend::{EntityExtractor, GraphSearch, VectorSearch},
    model::{Embedder, LanguageModel},
};
use crate::types::retrieval::{GraphQuery, Origin, SearchHit};

/// How a mock backend should fail, if at all.
#[derive(Debug, Clone)]
enum BackendFailure {
    Unavailable(String),
    Malformed(String),
}

impl BackendFailure {
    fn into_error(self, origin: Origin) -> BackendError {
        match self {
            Self::Unavailable(message) => BackendError::Unavailable { origin, message },
            Self::Malformed(message) => BackendError::MalformedQuery { origin, message },
        }
    }
}

/// A mock vector search backend.
///
/// Returns predefined hits by exact query text, falling back to a default
/// list. Never sleeps unless a delay is configured.
#[derive(Clone, Default)]
pub struct MockVectorSearch {
    /// Predefined hits by query text
    hits: Arc<RwLock<HashMap<String, Vec<SearchHit>>>>,

    /// Hits for any other query
    default_hits: Arc<RwLock<Vec<SearchHit>>>,

    delay: Option<Duration>,
    failure: Option<BackendFailure>,

    /// Query texts received, in order
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockVectorSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add predefined hits for a query.
    pub fn with_hits(self, query: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.hits.write().unwrap().insert(query.into(), hits);
        self
    }

    /// Hits returned for queries without predefined hits.
    pub fn with_default_hits(self, hits: Vec<SearchHit>) -> Self {
        *self.default_hits.write().unwrap() = hits;
        self
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call as unreachable.
    pub fn unavailable(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(BackendFailure::Unavailable(message.into()));
        self
    }

    /// Get all query texts received.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }
}

#[async_trait]
impl VectorSearch for MockVectorSearch {
    async fn vector_search(&self, query_text: &str, k: usize) -> BackendResult<Vec<SearchHit>> {
        self.calls.write().unwrap().push(query_text.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failure.clone() {
            return Err(failure.into_error(Origin::Vector));
        }

        let mut hits = self
            .hits
            .read()
            .unwrap()
            .get(query_text)
            .cloned()
            .unwrap_or_else(|| self.default_hits.read().unwrap().clone());
        hits.truncate(k);
        Ok(hits)
    }
}

/// A mock graph search backend.
///
/// Predefined hits are keyed by the seed entity id for seeded traversals and
/// by the query text otherwise.
#[derive(Clone, Default)]
pub struct MockGraphSearch {
    hits: Arc<RwLock<HashMap<String, Vec<SearchHit>>>>,
    default_hits: Arc<RwLock<Vec<SearchHit>>>,
    delay: Option<Duration>,
    failure: Option<BackendFailure>,
    calls: Arc<RwLock<Vec<GraphQuery>>>,
}

impl MockGraphSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add predefined hits for a seed entity id or a query text.
    pub fn with_hits(self, key: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.hits.write().unwrap().insert(key.into(), hits);
        self
    }

    pub fn with_default_hits(self, hits: Vec<SearchHit>) -> Self {
        *self.default_hits.write().unwrap() = hits;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unavailable(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(BackendFailure::Unavailable(message.into()));
        self
    }

    /// Reject every query as untranslatable.
    pub fn malformed(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(BackendFailure::Malformed(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<GraphQuery> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl GraphSearch for MockGraphSearch {
    async fn graph_search(&self, query: &GraphQuery) -> BackendResult<Vec<SearchHit>> {
        self.calls.write().unwrap().push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failure.clone() {
            return Err(failure.into_error(Origin::Graph));
        }

        let key = match query {
            GraphQuery::Seeded { entity_id, .. } => entity_id.as_str(),
            GraphQuery::Text { text } => text.as_str(),
        };
        Ok(self
            .hits
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.default_hits.read().unwrap().clone()))
    }
}

/// A mock entity extractor.
///
/// Returns predefined ids by exact text. Unknown text yields nothing, or
/// `n` fresh ids per call when configured with
/// [`with_default_entities_per_call`](Self::with_default_entities_per_call).
#[derive(Clone, Default)]
pub struct MockEntityExtractor {
    entities: Arc<RwLock<HashMap<String, Vec<String>>>>,
    generated_per_call: usize,
    failure: Option<String>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockEntityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(self, text: impl Into<String>, ids: Vec<String>) -> Self {
        self.entities.write().unwrap().insert(text.into(), ids);
        self
    }

    /// Generate `n` unique ids for any unknown text.
    pub fn with_default_entities_per_call(mut self, n: usize) -> Self {
        self.generated_per_call = n;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl EntityExtractor for MockEntityExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<String>> {
        let call_index = {
            let mut calls = self.calls.write().unwrap();
            calls.push(text.to_string());
            calls.len()
        };

        if let Some(message) = &self.failure {
            return Err(RagError::Model(message.clone().into()));
        }

        if let Some(ids) = self.entities.read().unwrap().get(text) {
            return Ok(ids.clone());
        }

        Ok((0..self.generated_per_call)
            .map(|i| format!("entity:{}:{}", call_index, i))
            .collect())
    }
}

/// A mock embedder.
///
/// Returns predefined embeddings, or deterministic sha2-seeded vectors for
/// unknown text, so the same text always embeds identically.
#[derive(Clone)]
pub struct MockEmbedder {
    embeddings: Arc<RwLock<HashMap<String, Vec<f32>>>>,
    dim: usize,
    fail_texts: Arc<RwLock<Vec<String>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            embeddings: Arc::default(),
            dim: 64,
            fail_texts: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Set the dimension of generated embeddings.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Add a predefined embedding for text.
    pub fn with_embedding(self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.embeddings
            .write()
            .unwrap()
            .insert(text.into(), embedding);
        self
    }

    /// Make embedding `text` fail.
    pub fn fail_text(self, text: impl Into<String>) -> Self {
        self.fail_texts.write().unwrap().push(text.into());
        self
    }

    /// Get all texts embedded.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    /// Generate a deterministic embedding based on text.
    fn generate_deterministic_embedding(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = hasher.finalize();

        (0..self.dim)
            .map(|i| {
                let byte = hash[i % 32] as f32;
                // Normalize to [-1, 1] range
                (byte / 127.5) - 1.0
            })
            .collect()
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.write().unwrap().push(text.to_string());

        if self.fail_texts.read().unwrap().iter().any(|t| t == text) {
            return Err(RagError::Embedding(format!("mock failure for '{}'", text)));
        }

        Ok(self
            .embeddings
            .read()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.generate_deterministic_embedding(text)))
    }
}

/// Scripted replies for prompts containing a marker.
#[derive(Debug, Clone)]
struct Script {
    marker: String,
    replies: Vec<std::result::Result<String, String>>,
    served: usize,
}

/// A mock language model.
///
/// Replies are scripted by a marker substring of the prompt; the first
/// matching script wins. A script with several replies serves them in order
/// and then repeats the last one. Unscripted prompts fail.
#[derive(Clone, Default)]
pub struct MockLanguageModel {
    scripts: Arc<RwLock<Vec<Script>>>,
    delay: Option<Duration>,

    /// Prompts received, in order
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `response` to any prompt containing `marker`.
    pub fn with_response(self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        self.script(marker.into(), vec![Ok(response.into())])
    }

    /// Reply with each response in turn, then keep repeating the last.
    pub fn with_responses(self, marker: impl Into<String>, responses: Vec<&str>) -> Self {
        let replies = responses.into_iter().map(|r| Ok(r.to_string())).collect();
        self.script(marker.into(), replies)
    }

    /// Fail any prompt containing `marker`.
    pub fn fail_on(self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        let message = format!("mock model failure on '{}'", marker);
        self.script(marker, vec![Err(message)])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all prompts received.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    fn script(self, marker: String, replies: Vec<std::result::Result<String, String>>) -> Self {
        self.scripts.write().unwrap().push(Script {
            marker,
            replies,
            served: 0,
        });
        self
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.write().unwrap().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut scripts = self.scripts.write().unwrap();
            scripts
                .iter_mut()
                .find(|s| prompt.contains(&s.marker))
                .and_then(|script| {
                    let index = script.served.min(script.replies.len().saturating_sub(1));
                    script.served += 1;
                    script.replies.get(index).cloned()
                })
        };

        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(RagError::Model(message.into())),
            None => Err(RagError::Model("no scripted reply for prompt".into())),
        }
    }
}
