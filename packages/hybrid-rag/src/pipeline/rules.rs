//! Ordered routing rules.
//!
//! A [`RuleSet`] is compiled once at startup and shared read-only (behind an
//! `Arc`) by every classifier. Rule order is part of its contract: the first
//! matching rule wins, and rules are never reordered by specificity.

use regex::Regex;

use crate::error::{RagError, Result};
use crate::types::{query::Query, routing::Strategy};

/// Whole-query greetings and meta questions.
const GREETING_PATTERN: &str = r"^(?:hi|hello|hey|hi there|hey there|howdy|good (?:morning|afternoon|evening)|thanks|thank you|thanks a lot|thx|bye|goodbye|who are you|what can you do)[\s!.?,]*$";

/// "relationship between X and Y", "how does X affect Y".
const RELATIONSHIP_PATTERN: &str = r"\brelationships? between\b|\bconnections? between\b|\bhow (?:does|do|did|will|would|could|might) .+? (?:affect|impact|influence|relate to)\b|\b(?:connected|linked) to\b";

/// Business metrics and aggregate/ranking language.
const BUSINESS_METRIC_PATTERN: &str = r"\brevenue at risk\b|\bat risk\b|\btop \d+\b|\btop (?:three|five|ten)\b|\b(?:highest|largest|biggest|most) (?:risk|risks|revenue|exposure|value)\b|\brank(?:ed|ing|ings)?\b|\bhow many\b|\b(?:total|sum of|average|count of)\b";

/// "compare X and Y", "difference between".
const COMPARATIVE_PATTERN: &str = r"\bcompar(?:e|es|ed|ing|ison)\b|\bdifferences? between\b|\bsimilarities between\b|\b(?:versus|vs)\b|\bcontrast\b";

/// Conceptual and definitional phrasing.
const CONCEPTUAL_PATTERN: &str = r"^(?:what is|what are|what's|whats|define|explain)\b|\bexplain\b|\bbest practices?\b|\bdefinition of\b|\bmeaning of\b|\bhow (?:do i|to)\b";

/// Match predicate for a routing rule.
#[derive(Debug, Clone)]
pub enum RulePredicate {
    /// Regex over the normalized query text
    Pattern(Regex),

    /// Any of these lower-case phrases appears in the normalized text
    Phrases(Vec<String>),
}

impl RulePredicate {
    pub fn matches(&self, query: &Query) -> bool {
        let text = query.normalized();
        match self {
            Self::Pattern(regex) => regex.is_match(text),
            Self::Phrases(phrases) => phrases.iter().any(|p| text.contains(p.as_str())),
        }
    }
}

/// A (predicate, strategy, confidence) triple with a stable id.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub id: String,
    pub predicate: RulePredicate,
    pub strategy: Strategy,
    pub confidence: f32,
}

impl RoutingRule {
    /// Rule matching a regex over normalized text.
    pub fn pattern(
        id: impl Into<String>,
        pattern: &str,
        strategy: Strategy,
        confidence: f32,
    ) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| RagError::Config(Box::new(e)))?;
        Ok(Self {
            id: id.into(),
            predicate: RulePredicate::Pattern(regex),
            strategy,
            confidence,
        })
    }

    /// Rule matching any of a set of phrases.
    pub fn phrases(
        id: impl Into<String>,
        phrases: impl IntoIterator<Item = impl Into<String>>,
        strategy: Strategy,
        confidence: f32,
    ) -> Self {
        Self {
            id: id.into(),
            predicate: RulePredicate::Phrases(
                phrases.into_iter().map(|p| p.into().to_lowercase()).collect(),
            ),
            strategy,
            confidence,
        }
    }

    pub fn matches(&self, query: &Query) -> bool {
        self.predicate.matches(query)
    }
}

/// An ordered, immutable list of routing rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<RoutingRule>,
}

impl RuleSet {
    /// Keep `rules` in exactly the given order.
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// The built-in rule list.
    ///
    /// Order: greeting, relationship, business metric, comparative, conceptual.
    pub fn standard() -> Result<Self> {
        Ok(Self::new(vec![
            RoutingRule::pattern("greeting", GREETING_PATTERN, Strategy::NoRetrieval, 0.95)?,
            RoutingRule::pattern("relationship", RELATIONSHIP_PATTERN, Strategy::Graph, 0.95)?,
            RoutingRule::pattern(
                "business_metric",
                BUSINESS_METRIC_PATTERN,
                Strategy::Graph,
                0.9,
            )?,
            RoutingRule::pattern(
                "comparative",
                COMPARATIVE_PATTERN,
                Strategy::HybridParallel,
                0.85,
            )?,
            RoutingRule::pattern("conceptual", CONCEPTUAL_PATTERN, Strategy::Vector, 0.9)?,
        ]))
    }

    /// First rule, in list order, whose predicate matches.
    pub fn first_match(&self, query: &Query) -> Option<&RoutingRule> {
        self.rules.iter().find(|rule| rule.matches(query))
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched_id(rules: &RuleSet, text: &str) -> Option<String> {
        rules.first_match(&Query::new(text)).map(|r| r.id.clone())
    }

    #[test]
    fn test_standard_rule_order() {
        let rules = RuleSet::standard().unwrap();
        let ids: Vec<&str> = rules.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["greeting", "relationship", "business_metric", "comparative", "conceptual"]
        );
    }

    #[test]
    fn test_relationship_queries() {
        let rules = RuleSet::standard().unwrap();
        for query in [
            "Show me the relationship between Disney and EA",
            "how does the merger affect EA",
            "connections between Pixar and Marvel",
        ] {
            assert_eq!(
                matched_id(&rules, query).as_deref(),
                Some("relationship"),
                "Expected relationship for: {}",
                query
            );
        }
    }

    #[test]
    fn test_business_metric_queries() {
        let rules = RuleSet::standard().unwrap();
        for query in [
            "What is the revenue at risk for Q3?",
            "top 5 customer risks",
            "which accounts have the highest exposure",
            "how many contracts renew this year",
        ] {
            assert_eq!(
                matched_id(&rules, query).as_deref(),
                Some("business_metric"),
                "Expected business_metric for: {}",
                query
            );
        }
    }

    #[test]
    fn test_earlier_rule_wins_over_later_match() {
        let rules = RuleSet::standard().unwrap();

        // Both comparative and conceptual ("what's") match; comparative is earlier.
        assert_eq!(
            matched_id(&rules, "What's the difference between an SLA and an SLO?").as_deref(),
            Some("comparative")
        );

        // Both business_metric and conceptual ("what are") match.
        assert_eq!(
            matched_id(&rules, "What are the top 3 risks?").as_deref(),
            Some("business_metric")
        );
    }

    #[test]
    fn test_greeting_only_matches_whole_query() {
        let rules = RuleSet::standard().unwrap();
        assert_eq!(matched_id(&rules, "Hello!").as_deref(), Some("greeting"));
        assert_eq!(matched_id(&rules, "thanks").as_deref(), Some("greeting"));
        assert_ne!(
            matched_id(&rules, "hello, what is an SLA?").as_deref(),
            Some("greeting")
        );
    }

    #[test]
    fn test_custom_order_is_respected() {
        let rules = RuleSet::new(vec![
            RoutingRule::phrases("catch_all", ["sla"], Strategy::Graph, 0.6),
            RoutingRule::pattern("conceptual", CONCEPTUAL_PATTERN, Strategy::Vector, 0.9)
                .unwrap(),
        ]);
        assert_eq!(matched_id(&rules, "What is an SLA?").as_deref(), Some("catch_all"));
    }

    #[test]
    fn test_no_match() {
        let rules = RuleSet::standard().unwrap();
        assert_eq!(matched_id(&rules, "Disney Netflix"), None);
    }
}
