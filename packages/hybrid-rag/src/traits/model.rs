//! Model traits: embeddings, completions, and pairwise relevance.

use async_trait::async_trait;

use crate::error::Result;

/// Text embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Text completion provider.
///
/// Used for grading, rewriting, and final answer generation. Raw output is
/// never trusted for control flow; callers parse and bound it.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Pairwise relevance scorer used by the optional rerank step.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score how relevant `content` is to `query`. Higher is better.
    async fn score(&self, query: &str, content: &str) -> Result<f32>;
}
