//! Deterministic, rule-ordered query classification.
//!
//! Rules first, then a known-entity count heuristic. Returns `None` when
//! neither applies so the caller can consult the semantic router.

use std::sync::Arc;

use tracing::debug;

use crate::pipeline::rules::RuleSet;
use crate::types::{
    query::Query,
    routing::{DecisionSource, RoutingDecision, Strategy},
};

/// Confidence when two or more known entities are present.
pub const MULTI_ENTITY_CONFIDENCE: f32 = 0.8;

/// Confidence when exactly one known entity is present.
pub const SINGLE_ENTITY_CONFIDENCE: f32 = 0.7;

/// Pure classifier over a shared, immutable rule list.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    rules: Arc<RuleSet>,
}

impl QueryClassifier {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Classify a query.
    ///
    /// Same input, same output: no clock, randomness, or IO is involved.
    pub fn classify(&self, query: &Query) -> Option<RoutingDecision> {
        if let Some(rule) = self.rules.first_match(query) {
            debug!(rule = %rule.id, strategy = %rule.strategy, "Routing rule matched");
            return Some(RoutingDecision::from_rule(
                rule.strategy,
                rule.confidence,
                &rule.id,
            ));
        }

        classify_by_entities(query)
    }
}

/// Entity-count fallback used when no rule matches.
pub fn classify_by_entities(query: &Query) -> Option<RoutingDecision> {
    let entities = query.entities();
    match entities.len() {
        0 => None,
        1 => Some(RoutingDecision::new(
            Strategy::Graph,
            SINGLE_ENTITY_CONFIDENCE,
            format!("one known entity: {}", entities[0].id),
            DecisionSource::EntityHeuristic,
        )),
        n => Some(RoutingDecision::new(
            Strategy::HybridSequential,
            MULTI_ENTITY_CONFIDENCE,
            format!("{} known entities", n),
            DecisionSource::EntityHeuristic,
        )),
    }
}
