//! Routing and retrieval pipeline.
//!
//! The pipeline composes:
//! - Rule-based classification with an entity-count fallback
//! - Embedding-similarity routing for everything rules miss
//! - Strategy execution against vector and graph backends
//! - Reciprocal Rank Fusion with optional reranking
//! - Context grading and query rewriting
//! - The workflow state machine that drives a request end to end

pub mod classifier;
pub mod controller;
pub mod fusion;
pub mod grader;
pub mod orchestrator;
pub mod prompts;
pub mod rewriter;
pub mod router;
pub mod rules;
pub mod semantic;

pub use classifier::{classify_by_entities, QueryClassifier};
pub use controller::{Collaborators, WorkflowController};
pub use fusion::{
    keyword_overlap, reciprocal_rank_fusion, KeywordOverlapScorer, RankedList, ResultFuser,
};
pub use grader::{parse_grade, ContextGrader};
pub use orchestrator::RetrievalOrchestrator;
pub use prompts::{
    format_answer_prompt, format_grade_prompt, format_rewrite_prompt, ANSWER_PROMPT,
    GRADE_CONTEXT_PROMPT, REWRITE_QUERY_PROMPT,
};
pub use rewriter::{parse_rewrite, QueryRewriter};
pub use router::{QueryRouter, Routed, AMBIGUOUS_STRATEGY};
pub use rules::{RoutingRule, RulePredicate, RuleSet};
pub use semantic::{cosine_similarity, ExemplarIndex, SemanticRoute, SemanticRouter};
