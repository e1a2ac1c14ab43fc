//! Per-request workflow state and the orchestration outcome.
//!
//! A [`WorkflowState`] is created at request start, mutated only by the
//! workflow controller (and the rewriter it drives), and dropped when the
//! request completes. Nothing in it is shared across requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    query::Query,
    retrieval::FusedResult,
    routing::{clamp_unit, RoutingDecision},
};

/// Relevance grade for one retrieval round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedContext {
    /// Within [0, 1].
    pub quality_score: f32,

    /// True iff `quality_score < threshold`.
    pub needs_refinement: bool,

    /// Short justification from the grader
    pub justification: String,

    /// True when the grade is the assume-acceptable default, not a model verdict
    pub fallback: bool,
}

impl GradedContext {
    /// Build a grade, clamping the score and deriving `needs_refinement`.
    pub fn new(quality_score: f32, threshold: f32, justification: impl Into<String>) -> Self {
        let quality_score = clamp_unit(quality_score);
        Self {
            quality_score,
            needs_refinement: quality_score < threshold,
            justification: justification.into(),
            fallback: false,
        }
    }

    /// Assume-acceptable grade used when grading could not run.
    pub fn assumed_acceptable(threshold: f32, reason: impl Into<String>) -> Self {
        Self {
            fallback: true,
            ..Self::new(threshold, threshold, reason)
        }
    }
}

/// States of the request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPhase {
    Route,
    Retrieve,
    Grade,
    Rewrite,
    Fuse,
    Generate,
    Error,
    Done,
}

/// Recoverable-error taxonomy recorded in the error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No rule, entity, or semantic decision; defaulted to HYBRID_PARALLEL
    ClassificationAmbiguous,
    RetrievalTimeout,
    RetrievalBackendError,
    /// Grading fell back to assume-acceptable
    GradingFailure,
    RewriteFailure,
    GenerationFailure,
    DeadlineExceeded,
    Cancelled,
}

/// One entry in the workflow's error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub phase: WorkflowPhase,
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Mutable state owned by exactly one request.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    request_id: Uuid,
    original: Query,
    query: Query,
    decision: Option<RoutingDecision>,
    fused: Option<FusedResult>,
    graded: Option<GradedContext>,
    best: Option<(FusedResult, GradedContext)>,
    retry_count: u32,
    max_retries: u32,
    error_log: Vec<ErrorRecord>,
    routing_trace: Vec<RoutingDecision>,
    tools_used: Vec<String>,
    phases: Vec<WorkflowPhase>,
}

impl WorkflowState {
    /// Start a new request.
    pub fn new(query: Query, max_retries: u32) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            original: query.clone(),
            query,
            decision: None,
            fused: None,
            graded: None,
            best: None,
            retry_count: 0,
            max_retries,
            error_log: Vec::new(),
            routing_trace: Vec::new(),
            tools_used: Vec::new(),
            phases: Vec::new(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The query as first received.
    pub fn original_query(&self) -> &Query {
        &self.original
    }

    /// The query currently being routed (possibly rewritten).
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// The single in-flight routing decision, if any.
    pub fn decision(&self) -> Option<&RoutingDecision> {
        self.decision.as_ref()
    }

    pub fn fused(&self) -> Option<&FusedResult> {
        self.fused.as_ref()
    }

    pub fn graded(&self) -> Option<&GradedContext> {
        self.graded.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn error_log(&self) -> &[ErrorRecord] {
        &self.error_log
    }

    pub fn routing_trace(&self) -> &[RoutingDecision] {
        &self.routing_trace
    }

    pub fn tools_used(&self) -> &[String] {
        &self.tools_used
    }

    pub fn phases(&self) -> &[WorkflowPhase] {
        &self.phases
    }

    /// Best graded round so far: highest quality, earliest on ties.
    pub fn best(&self) -> Option<&(FusedResult, GradedContext)> {
        self.best.as_ref()
    }

    pub(crate) fn enter(&mut self, phase: WorkflowPhase) {
        self.phases.push(phase);
    }

    /// Replace the in-flight decision and append it to the trace.
    pub(crate) fn set_decision(&mut self, decision: RoutingDecision) {
        self.routing_trace.push(decision.clone());
        self.decision = Some(decision);
    }

    pub(crate) fn set_fused(&mut self, fused: FusedResult) {
        for tool in fused.tools_used() {
            if !self.tools_used.iter().any(|t| t == tool.as_str()) {
                self.tools_used.push(tool.as_str().to_string());
            }
        }
        self.fused = Some(fused);
    }

    /// Record a grade for the current round and update the best round.
    pub(crate) fn set_graded(&mut self, graded: GradedContext) {
        let improves = self
            .best
            .as_ref()
            .map(|(_, best)| graded.quality_score > best.quality_score)
            .unwrap_or(true);

        if improves {
            if let Some(fused) = &self.fused {
                self.best = Some((fused.clone(), graded.clone()));
            }
        }
        self.graded = Some(graded);
    }

    /// Consume one retry and switch to `query`.
    ///
    /// Returns false, leaving state untouched, once `max_retries` is spent.
    /// Clears the in-flight decision, result, and grade.
    pub(crate) fn begin_retry(&mut self, query: Query) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.retry_count += 1;
        self.query = query;
        self.decision = None;
        self.fused = None;
        self.graded = None;
        true
    }

    pub(crate) fn log_error(
        &mut self,
        phase: WorkflowPhase,
        kind: ErrorKind,
        message: impl Into<String>,
    ) {
        self.error_log.push(ErrorRecord {
            phase,
            kind,
            message: message.into(),
            at: Utc::now(),
        });
    }
}

/// Everything a caller gets back from `orchestrate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    pub request_id: Uuid,

    /// Final fused, graded (and possibly reranked) context
    pub answer_context: FusedResult,

    /// Collaborator tools actually exercised, in first-use order
    pub tools_used: Vec<String>,

    /// Set when retries ran out below threshold or the workflow degraded
    pub low_confidence: bool,

    /// Every routing decision made, in order
    pub routing_trace: Vec<RoutingDecision>,

    /// Generated answer, when generation ran and succeeded
    pub answer: Option<String>,

    /// Grade of the chosen context, if it was graded
    pub quality_score: Option<f32>,

    pub retry_count: u32,

    pub error_log: Vec<ErrorRecord>,

    /// Visited states, in order
    pub phases: Vec<WorkflowPhase>,
}

impl OrchestrationOutcome {
    pub fn partial(&self) -> bool {
        self.answer_context.partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        retrieval::{Origin, SourceReport},
        routing::{DecisionSource, Strategy},
    };

    fn fused_with_vector_call() -> FusedResult {
        FusedResult {
            sources: vec![SourceReport::ok(Origin::Vector, 0)],
            ..Default::default()
        }
    }

    #[test]
    fn test_graded_context_threshold() {
        let graded = GradedContext::new(0.69, 0.7, "thin");
        assert!(graded.needs_refinement);

        let graded = GradedContext::new(0.7, 0.7, "ok");
        assert!(!graded.needs_refinement);

        let graded = GradedContext::new(3.0, 0.7, "clamped");
        assert_eq!(graded.quality_score, 1.0);
    }

    #[test]
    fn test_assumed_acceptable_does_not_need_refinement() {
        let graded = GradedContext::assumed_acceptable(0.7, "grader timed out");
        assert!(graded.fallback);
        assert!(!graded.needs_refinement);
        assert!((graded.quality_score - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_retry_is_bounded() {
        let mut state = WorkflowState::new(Query::new("q"), 2);
        assert!(state.begin_retry(Query::new("q1")));
        assert!(state.begin_retry(Query::new("q2")));
        assert!(!state.begin_retry(Query::new("q3")));
        assert_eq!(state.retry_count(), 2);
        assert_eq!(state.query().raw(), "q2");
        assert_eq!(state.original_query().raw(), "q");
    }

    #[test]
    fn test_single_in_flight_decision() {
        let mut state = WorkflowState::new(Query::new("q"), 1);
        state.set_decision(RoutingDecision::new(
            Strategy::Vector,
            0.9,
            "a",
            DecisionSource::Rule,
        ));
        state.set_decision(RoutingDecision::new(
            Strategy::Graph,
            0.7,
            "b",
            DecisionSource::EntityHeuristic,
        ));

        assert_eq!(state.decision().unwrap().strategy, Strategy::Graph);
        assert_eq!(state.routing_trace().len(), 2);

        state.begin_retry(Query::new("q1"));
        assert!(state.decision().is_none());
        assert_eq!(state.routing_trace().len(), 2);
    }

    #[test]
    fn test_best_round_keeps_earliest_on_tie() {
        let mut state = WorkflowState::new(Query::new("q"), 2);

        state.set_fused(fused_with_vector_call());
        state.set_graded(GradedContext::new(0.5, 0.7, "first"));

        state.begin_retry(Query::new("q1"));
        state.set_fused(FusedResult::empty());
        state.set_graded(GradedContext::new(0.5, 0.7, "second"));

        assert_eq!(state.best().unwrap().1.justification, "first");
        assert_eq!(state.tools_used(), &["vector_search".to_string()]);
    }
}
