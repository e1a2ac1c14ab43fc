//! Composite router: rule classifier with semantic fallback.

use tracing::{debug, warn};

use crate::pipeline::{classifier::QueryClassifier, semantic::SemanticRouter};
use crate::types::{
    config::SemanticConfig,
    query::Query,
    routing::{DecisionSource, RoutingDecision, Strategy},
};

/// Strategy used when nothing else can decide.
pub const AMBIGUOUS_STRATEGY: Strategy = Strategy::HybridParallel;

/// A routing decision plus why it was ambiguous, if it was.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub decision: RoutingDecision,
    pub ambiguity: Option<String>,
}

/// Routes queries: rules, then known entities, then embedding similarity.
#[derive(Clone)]
pub struct QueryRouter {
    classifier: QueryClassifier,
    semantic: Option<SemanticRouter>,
}

impl QueryRouter {
    /// Router without a semantic fallback.
    pub fn new(classifier: QueryClassifier) -> Self {
        Self {
            classifier,
            semantic: None,
        }
    }

    /// Add the embedding-similarity fallback.
    pub fn with_semantic(mut self, semantic: SemanticRouter) -> Self {
        self.semantic = Some(semantic);
        self
    }

    /// Apply `config` to the semantic fallback, if one is installed.
    pub fn with_semantic_config(mut self, config: &SemanticConfig) -> Self {
        self.semantic = self
            .semantic
            .map(|semantic| semantic.with_min_confidence(config.min_confidence));
        self
    }

    pub fn semantic(&self) -> Option<&SemanticRouter> {
        self.semantic.as_ref()
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    /// Produce a routing decision for `query`.
    pub async fn route(&self, query: &Query) -> RoutingDecision {
        self.resolve(query).await.decision
    }

    /// Like [`route`](Self::route), also reporting classification ambiguity.
    pub async fn resolve(&self, query: &Query) -> Routed {
        if let Some(decision) = self.classifier.classify(query) {
            return Routed {
                decision,
                ambiguity: None,
            };
        }

        let reason = match &self.semantic {
            Some(semantic) => match semantic.route(query).await {
                Ok(decision) => {
                    debug!(strategy = %decision.strategy, confidence = decision.confidence, "Semantic routing");
                    return Routed {
                        decision,
                        ambiguity: None,
                    };
                }
                Err(e) => {
                    warn!(error = %e, "Semantic routing failed");
                    format!("semantic routing failed: {}", e)
                }
            },
            None => "no rule, entity, or semantic router".to_string(),
        };

        Routed {
            decision: RoutingDecision::new(
                AMBIGUOUS_STRATEGY,
                0.0,
                format!("ambiguous ({}); default {}", reason, AMBIGUOUS_STRATEGY),
                DecisionSource::Semantic,
            ),
            ambiguity: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::{
        rules::RuleSet,
        semantic::{ExemplarIndex, SemanticRoute},
    };
    use crate::testing::MockEmbedder;
    use crate::traits::model::Embedder;

    fn classifier() -> QueryClassifier {
        QueryClassifier::new(Arc::new(RuleSet::standard().unwrap()))
    }

    #[tokio::test]
    async fn test_rule_short_circuits_semantic() {
        let embedder = Arc::new(MockEmbedder::new().with_dim(8));
        let index = ExemplarIndex::build(SemanticRoute::standard(), embedder.as_ref())
            .await
            .unwrap();
        embedder.clear_calls();

        let router = QueryRouter::new(classifier()).with_semantic(SemanticRouter::new(
            Arc::new(index),
            embedder.clone(),
            0.5,
        ));

        let decision = router.route(&Query::new("What is an SLA?")).await;
        assert_eq!(decision.strategy, Strategy::Vector);
        assert_eq!(decision.source, DecisionSource::Rule);
        assert!(embedder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_semantic_config_sets_floor() {
        let embedder = Arc::new(MockEmbedder::new().with_dim(8));
        let index = ExemplarIndex::build(SemanticRoute::standard(), embedder.as_ref())
            .await
            .unwrap();
        let router = QueryRouter::new(classifier())
            .with_semantic(SemanticRouter::new(Arc::new(index), embedder, 0.1))
            .with_semantic_config(&SemanticConfig { min_confidence: 0.8 });

        assert_eq!(router.semantic().unwrap().min_confidence(), 0.8);
    }

    #[tokio::test]
    async fn test_semantic_config_without_semantic_router() {
        let router = QueryRouter::new(classifier())
            .with_semantic_config(&SemanticConfig { min_confidence: 0.8 });
        assert!(router.semantic().is_none());
    }

    #[tokio::test]
    async fn test_ambiguous_without_semantic_router() {
        let routed = QueryRouter::new(classifier())
            .resolve(&Query::new("quarterly vibes"))
            .await;
        assert_eq!(routed.decision.strategy, Strategy::HybridParallel);
        assert!(routed.ambiguity.is_some());
    }

    #[tokio::test]
    async fn test_ambiguous_when_embedding_fails() {
        let embedder: Arc<dyn Embedder> =
            Arc::new(MockEmbedder::new().with_dim(4).fail_text("quarterly vibes"));
        let index = ExemplarIndex::build(SemanticRoute::standard(), embedder.as_ref())
            .await
            .unwrap();
        let router = QueryRouter::new(classifier())
            .with_semantic(SemanticRouter::new(Arc::new(index), embedder, 0.5));

        let routed = router.resolve(&Query::new("quarterly vibes")).await;
        assert_eq!(routed.decision.strategy, Strategy::HybridParallel);
        assert!(routed.ambiguity.unwrap().contains("semantic routing failed"));
    }
}
