//! Embedding-similarity routing.
//!
//! Consulted only when the rule classifier defers. Exemplar embeddings are
//! computed once at startup into an [`ExemplarIndex`] and shared read-only.

use std::sync::Arc;

use tracing::debug;

use crate::error::{RagError, Result};
use crate::traits::model::Embedder;
use crate::types::{
    query::Query,
    routing::{DecisionSource, RoutingDecision, Strategy},
};

/// A named route with canonical exemplar phrases.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticRoute {
    pub name: String,
    pub strategy: Strategy,
    pub exemplars: Vec<String>,
}

impl SemanticRoute {
    pub fn new(
        name: impl Into<String>,
        strategy: Strategy,
        exemplars: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            strategy,
            exemplars: exemplars.into_iter().map(|e| e.into()).collect(),
        }
    }

    /// Built-in routes.
    pub fn standard() -> Vec<SemanticRoute> {
        vec![
            SemanticRoute::new(
                "graph_lookup",
                Strategy::Graph,
                [
                    "which customers depend on this vendor",
                    "who owns this subsidiary",
                    "list the contracts linked to this account",
                    "what risks are tied to this supplier",
                ],
            ),
            SemanticRoute::new(
                "document_lookup",
                Strategy::Vector,
                [
                    "summarize our incident response policy",
                    "find documentation about onboarding",
                    "guidelines for writing service agreements",
                    "tell me about escalation procedures",
                ],
            ),
            SemanticRoute::new(
                "side_by_side",
                Strategy::HybridParallel,
                [
                    "how do these two vendors stack up",
                    "pros and cons of each supplier",
                    "which of these partners is a better fit",
                ],
            ),
            SemanticRoute::new(
                "entity_deep_dive",
                Strategy::HybridSequential,
                [
                    "everything we know about this partner and its connections",
                    "background on this company and the deals it is part of",
                ],
            ),
            SemanticRoute::new(
                "small_talk",
                Strategy::NoRetrieval,
                ["how are you today", "nice to meet you", "what is your name"],
            ),
        ]
    }
}

#[derive(Debug, Clone)]
struct Exemplar {
    route: usize,
    phrase: String,
    embedding: Vec<f32>,
}

/// Immutable exemplar embeddings for a set of routes.
#[derive(Debug, Clone)]
pub struct ExemplarIndex {
    routes: Vec<SemanticRoute>,
    exemplars: Vec<Exemplar>,
}

impl ExemplarIndex {
    /// Embed every exemplar once.
    pub async fn build(routes: Vec<SemanticRoute>, embedder: &dyn Embedder) -> Result<Self> {
        let phrases: Vec<(usize, &str)> = routes
            .iter()
            .enumerate()
            .flat_map(|(i, route)| route.exemplars.iter().map(move |e| (i, e.as_str())))
            .collect();

        let texts: Vec<&str> = phrases.iter().map(|(_, p)| *p).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        if embeddings.len() != phrases.len() {
            return Err(RagError::Embedding(format!(
                "expected {} exemplar embeddings, got {}",
                phrases.len(),
                embeddings.len()
            )));
        }

        let exemplars = phrases
            .into_iter()
            .zip(embeddings)
            .map(|((route, phrase), embedding)| Exemplar {
                route,
                phrase: phrase.to_string(),
                embedding,
            })
            .collect();

        Ok(Self { routes, exemplars })
    }

    pub fn routes(&self) -> &[SemanticRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.exemplars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exemplars.is_empty()
    }

    /// Best-matching exemplar: (route, phrase, similarity).
    ///
    /// Ties keep the exemplar that was indexed first.
    pub fn best_match(&self, embedding: &[f32]) -> Option<(&SemanticRoute, &str, f32)> {
        let mut best: Option<(&Exemplar, f32)> = None;
        for exemplar in &self.exemplars {
            let similarity = cosine_similarity(embedding, &exemplar.embedding);
            if best.map(|(_, s)| similarity > s).unwrap_or(true) {
                best = Some((exemplar, similarity));
            }
        }
        best.map(|(e, s)| (&self.routes[e.route], e.phrase.as_str(), s))
    }
}

/// Embedding-similarity router.
#[derive(Clone)]
pub struct SemanticRouter {
    index: Arc<ExemplarIndex>,
    embedder: Arc<dyn Embedder>,
    min_confidence: f32,
}

impl SemanticRouter {
    pub fn new(index: Arc<ExemplarIndex>, embedder: Arc<dyn Embedder>, min_confidence: f32) -> Self {
        Self {
            index,
            embedder,
            min_confidence,
        }
    }

    /// Replace the similarity floor.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Route by nearest exemplar.
    ///
    /// Below `min_confidence` this returns VECTOR as a conservative default.
    /// Errors only when no decision can be made at all (embedding failure or
    /// an empty index).
    pub async fn route(&self, query: &Query) -> Result<RoutingDecision> {
        let embedding = self.embedder.embed(query.normalized()).await?;

        let (route, phrase, similarity) = self
            .index
            .best_match(&embedding)
            .ok_or_else(|| RagError::Embedding("exemplar index is empty".into()))?;

        debug!(
            route = %route.name,
            exemplar = %phrase,
            similarity,
            "Semantic route candidate"
        );

        if similarity < self.min_confidence {
            return Ok(RoutingDecision::new(
                Strategy::Vector,
                similarity,
                format!(
                    "semantic:{} below floor {:.2}; default VECTOR",
                    route.name, self.min_confidence
                ),
                DecisionSource::Semantic,
            ));
        }

        Ok(RoutingDecision::new(
            route.strategy,
            similarity,
            format!("semantic:{}", route.name),
            DecisionSource::Semantic,
        ))
    }
}

/// Cosine similarity; 0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
