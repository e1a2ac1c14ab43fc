//! Retrieval items, per-source reports, and fused results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend a retrieval item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    Vector,
    Graph,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => f.write_str("vector"),
            Self::Graph => f.write_str("graph"),
        }
    }
}

/// A raw hit as returned by a search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub score: f32,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score,
        }
    }

    /// Tag this hit with the backend it came from.
    pub fn into_item(self, origin: Origin) -> RetrievalItem {
        RetrievalItem {
            id: self.id,
            content: self.content,
            origin,
            score: self.score,
        }
    }
}

/// A single retrieved item tagged with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalItem {
    pub id: String,
    pub content: String,
    pub origin: Origin,

    /// Backend-native score, not normalized.
    pub score: f32,
}

/// Input to the graph collaborator.
///
/// Natural-language-to-structured-query translation is the collaborator's job;
/// the orchestrator only decides whether a traversal is seeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphQuery {
    /// Free-text question for the collaborator to translate.
    Text { text: String },

    /// Traversal seeded from a known entity.
    Seeded { entity_id: String, text: String },
}

impl GraphQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn seeded(entity_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Seeded {
            entity_id: entity_id.into(),
            text: text.into(),
        }
    }

    /// The natural-language text carried by this query.
    pub fn query_text(&self) -> &str {
        match self {
            Self::Text { text } | Self::Seeded { text, .. } => text,
        }
    }
}

/// A collaborator tool the orchestrator can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    VectorSearch,
    GraphSearch,
    EntityExtraction,
}

impl Tool {
    /// Name reported in `tools_used`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VectorSearch => "vector_search",
            Self::GraphSearch => "graph_search",
            Self::EntityExtraction => "entity_extraction",
        }
    }

    /// The item origin for search tools.
    pub fn origin(&self) -> Option<Origin> {
        match self {
            Self::VectorSearch => Some(Origin::Vector),
            Self::GraphSearch => Some(Origin::Graph),
            Self::EntityExtraction => None,
        }
    }
}

impl From<Origin> for Tool {
    fn from(origin: Origin) -> Self {
        match origin {
            Origin::Vector => Self::VectorSearch,
            Origin::Graph => Self::GraphSearch,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one collaborator call ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Ok { items: usize },
    TimedOut,
    Failed { message: String },
}

/// Typed result of one collaborator call, carrying a success flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub tool: Tool,

    /// Entity id the call was seeded from, if any
    pub seed: Option<String>,

    pub outcome: SourceOutcome,
}

impl SourceReport {
    pub fn ok(tool: impl Into<Tool>, items: usize) -> Self {
        Self {
            tool: tool.into(),
            seed: None,
            outcome: SourceOutcome::Ok { items },
        }
    }

    pub fn timed_out(tool: impl Into<Tool>) -> Self {
        Self {
            tool: tool.into(),
            seed: None,
            outcome: SourceOutcome::TimedOut,
        }
    }

    pub fn failed(tool: impl Into<Tool>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            seed: None,
            outcome: SourceOutcome::Failed {
                message: message.into(),
            },
        }
    }

    pub fn with_seed(mut self, entity_id: impl Into<String>) -> Self {
        self.seed = Some(entity_id.into());
        self
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Ok { .. })
    }
}

/// An item after rank fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedItem {
    pub item: RetrievalItem,

    /// Summed reciprocal-rank contributions
    pub fused_score: f64,

    /// Every origin that contributed, vector before graph
    pub origins: Vec<Origin>,

    /// Score assigned by the reranker, if one ran over this item
    pub rerank_score: Option<f32>,
}

/// Ordered, fused retrieval output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub items: Vec<FusedItem>,

    /// True when some source timed out or failed and contributed nothing
    pub partial: bool,

    /// One report per collaborator call made for this result
    pub sources: Vec<SourceReport>,

    /// Entities extracted to seed graph traversal, when extraction ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_entities: Option<Vec<String>>,
}

impl FusedResult {
    /// An empty, complete result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item ids in fused order.
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.item.id.as_str()).collect()
    }

    /// True when at least one search call was made and none succeeded.
    pub fn all_sources_failed(&self) -> bool {
        let searches: Vec<&SourceReport> = self
            .sources
            .iter()
            .filter(|s| s.tool.origin().is_some())
            .collect();
        !searches.is_empty() && searches.iter().all(|s| !s.succeeded())
    }

    /// Collaborator tools exercised to produce this result, in first-use order.
    pub fn tools_used(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = Vec::new();
        for report in &self.sources {
            if !tools.contains(&report.tool) {
                tools.push(report.tool);
            }
        }
        tools
    }

    /// Whether any item came from `origin`.
    pub fn has_origin(&self, origin: Origin) -> bool {
        self.items.iter().any(|i| i.origins.contains(&origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sources_failed() {
        let mut result = FusedResult::empty();
        assert!(!result.all_sources_failed());

        result.sources.push(SourceReport::timed_out(Origin::Vector));
        result.sources.push(SourceReport::failed(Origin::Graph, "down"));
        assert!(result.all_sources_failed());

        result.sources.push(SourceReport::ok(Origin::Graph, 0).with_seed("org:ea"));
        assert!(!result.all_sources_failed());
    }

    #[test]
    fn test_extraction_alone_is_not_a_search_failure() {
        let result = FusedResult {
            sources: vec![SourceReport::failed(Tool::EntityExtraction, "model down")],
            ..Default::default()
        };
        assert!(!result.all_sources_failed());
    }

    #[test]
    fn test_tools_used_in_first_use_order() {
        let result = FusedResult {
            sources: vec![
                SourceReport::ok(Origin::Vector, 3),
                SourceReport::ok(Tool::EntityExtraction, 2),
                SourceReport::ok(Origin::Graph, 2).with_seed("org:ea"),
                SourceReport::failed(Origin::Graph, "bad query").with_seed("org:disney"),
            ],
            seed_entities: Some(vec!["org:ea".into(), "org:disney".into()]),
            ..Default::default()
        };
        assert_eq!(
            result.tools_used(),
            vec![Tool::VectorSearch, Tool::EntityExtraction, Tool::GraphSearch]
        );
    }

    #[test]
    fn test_graph_query_text() {
        assert_eq!(GraphQuery::text("who owns EA").query_text(), "who owns EA");
        let seeded = GraphQuery::seeded("org:ea", "who owns EA");
        assert_eq!(seeded.query_text(), "who owns EA");
    }
}
