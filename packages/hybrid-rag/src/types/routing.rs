//! Routing decisions and the fixed set of retrieval strategies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Retrieval strategy a query can be routed to.
///
/// This is a closed set: every dispatch over it is an exhaustive `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Pure similarity search.
    ///
    /// Example: "What is an SLA?"
    Vector,

    /// Pure structured-graph traversal.
    ///
    /// Example: "Show me the relationship between Disney and EA"
    Graph,

    /// Vector results seed graph traversal from the entities they mention.
    HybridSequential,

    /// Vector and graph run concurrently and are merged by rank fusion.
    ///
    /// Example: "Compare Disney and Netflix"
    HybridParallel,

    /// No retrieval (greetings, meta questions).
    NoRetrieval,
}

impl Strategy {
    /// All strategies, in declaration order.
    pub const ALL: [Strategy; 5] = [
        Strategy::Vector,
        Strategy::Graph,
        Strategy::HybridSequential,
        Strategy::HybridParallel,
        Strategy::NoRetrieval,
    ];

    /// Stable upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "VECTOR",
            Self::Graph => "GRAPH",
            Self::HybridSequential => "HYBRID_SEQUENTIAL",
            Self::HybridParallel => "HYBRID_PARALLEL",
            Self::NoRetrieval => "NO_RETRIEVAL",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which mechanism produced a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionSource {
    /// An explicit routing rule matched
    Rule,

    /// Embedding similarity against route exemplars
    Semantic,

    /// Known-entity count fallback
    EntityHeuristic,
}

/// The outcome of one routing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub strategy: Strategy,

    /// Always within [0, 1].
    pub confidence: f32,

    /// Free text, e.g. the id of the matched rule.
    pub reasoning: String,

    pub source: DecisionSource,
}

impl RoutingDecision {
    /// Create a decision, clamping `confidence` into [0, 1].
    ///
    /// NaN confidence becomes 0.
    pub fn new(
        strategy: Strategy,
        confidence: f32,
        reasoning: impl Into<String>,
        source: DecisionSource,
    ) -> Self {
        Self {
            strategy,
            confidence: clamp_unit(confidence),
            reasoning: reasoning.into(),
            source,
        }
    }

    /// Decision produced by a matched rule.
    pub fn from_rule(strategy: Strategy, confidence: f32, rule_id: &str) -> Self {
        Self::new(
            strategy,
            confidence,
            format!("rule:{}", rule_id),
            DecisionSource::Rule,
        )
    }
}

/// Clamp a score into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
