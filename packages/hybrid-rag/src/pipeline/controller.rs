//! Request lifecycle as an explicit state machine.
//!
//! ```text
//! ROUTE -> RETRIEVE -> GRADE -> (REWRITE -> ROUTE)* -> FUSE -> GENERATE -> DONE
//!             |
//!             +-> ERROR -> FUSE -> GENERATE   (every search call failed)
//! ```
//!
//! A global deadline and an optional caller cancellation cap the loop. Either
//! one drops in-flight work and jumps straight to FUSE/GENERATE with the best
//! context seen so far. The caller never sees a collaborator failure; the
//! only error `orchestrate` returns is for an empty query.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{RagError, Result};
use crate::pipeline::{
    fusion::ResultFuser,
    grader::ContextGrader,
    orchestrator::RetrievalOrchestrator,
    prompts::format_answer_prompt,
    rewriter::QueryRewriter,
    router::QueryRouter,
};
use crate::traits::{
    backend::{EntityExtractor, GraphSearch, VectorSearch},
    model::{LanguageModel, RelevanceScorer},
};
use crate::types::{
    config::OrchestratorConfig,
    query::{EntityCatalog, Query},
    retrieval::{FusedResult, SourceOutcome},
    routing::{RoutingDecision, Strategy},
    workflow::{ErrorKind, GradedContext, OrchestrationOutcome, WorkflowPhase, WorkflowState},
};

/// External capabilities the workflow drives.
#[derive(Clone)]
pub struct Collaborators {
    pub vector: Arc<dyn VectorSearch>,
    pub graph: Arc<dyn GraphSearch>,
    pub extractor: Arc<dyn EntityExtractor>,

    /// Used for grading, rewriting, and answer generation
    pub model: Arc<dyn LanguageModel>,
}

/// Why the round loop stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Deadline,
    Cancelled,
}

/// Drives one request through routing, retrieval, grading, and generation.
///
/// Holds only immutable, shareable pieces; all per-request state lives in a
/// [`WorkflowState`] created inside `orchestrate`.
#[derive(Clone)]
pub struct WorkflowController {
    router: QueryRouter,
    retriever: RetrievalOrchestrator,
    grader: ContextGrader,
    rewriter: QueryRewriter,
    model: Arc<dyn LanguageModel>,
    catalog: Arc<EntityCatalog>,
    config: OrchestratorConfig,
}

impl WorkflowController {
    /// Build a controller. Fails only on invalid configuration.
    ///
    /// `config.semantic` overrides the floor of the router's semantic
    /// fallback.
    pub fn new(
        router: QueryRouter,
        collaborators: Collaborators,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let retriever = RetrievalOrchestrator::new(
            collaborators.vector,
            collaborators.graph,
            collaborators.extractor,
        )
        .with_config(config.retrieval.clone())
        .with_fuser(ResultFuser::new(config.fusion.clone()));

        let grader = ContextGrader::new(collaborators.model.clone(), config.quality_threshold)
            .with_timeout(config.generation_timeout);
        let rewriter = QueryRewriter::new(collaborators.model.clone())
            .with_timeout(config.generation_timeout);

        Ok(Self {
            router: router.with_semantic_config(&config.semantic),
            retriever,
            grader,
            rewriter,
            model: collaborators.model,
            catalog: Arc::new(EntityCatalog::empty()),
            config,
        })
    }

    /// Known entities, used for incoming and rewritten queries.
    pub fn with_catalog(mut self, catalog: Arc<EntityCatalog>) -> Self {
        self.rewriter = self.rewriter.with_catalog(catalog.clone());
        self.catalog = catalog;
        self
    }

    /// Enable the rerank step (also requires `fusion.rerank_top_n`).
    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        let fuser = ResultFuser::new(self.config.fusion.clone()).with_scorer(scorer);
        self.retriever = self.retriever.with_fuser(fuser);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Build a [`Query`] with entities detected from the configured catalog.
    pub fn query(&self, raw: impl Into<String>) -> Query {
        Query::with_catalog(raw, &self.catalog)
    }

    /// Routing decision for `query`, without retrieving.
    pub async fn route(&self, query: &Query) -> RoutingDecision {
        self.router.route(query).await
    }

    /// Run one strategy for `query` and return the fused result.
    pub async fn retrieve(&self, query: &Query, strategy: Strategy) -> FusedResult {
        self.retriever.retrieve(query, strategy).await
    }

    /// Run the full workflow for `query`.
    pub async fn orchestrate(&self, query: Query) -> Result<OrchestrationOutcome> {
        self.orchestrate_with_cancel(query, CancellationToken::new())
            .await
    }

    /// Run the full workflow, stopping early when `cancel` fires.
    pub async fn orchestrate_with_cancel(
        &self,
        query: Query,
        cancel: CancellationToken,
    ) -> Result<OrchestrationOutcome> {
        if query.is_empty() {
            return Err(RagError::InvalidQuery {
                reason: "query is empty".to_string(),
            });
        }

        let state = WorkflowState::new(query, self.config.max_retries);
        let span = info_span!("orchestrate", request_id = %state.request_id());
        Ok(self.run(state, cancel).instrument(span).await)
    }

    async fn run(&self, mut state: WorkflowState, cancel: CancellationToken) -> OrchestrationOutcome {
        info!(query = %state.query().raw(), "Orchestration started");
        let deadline = Instant::now() + self.config.deadline;

        let mut interrupt = tokio::select! {
            biased;
            _ = cancel.cancelled() => Some(Interrupt::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Some(Interrupt::Deadline),
            _ = self.run_rounds(&mut state, &cancel) => None,
        };

        if let Some(interrupt) = interrupt {
            let phase = state.phases().last().copied().unwrap_or(WorkflowPhase::Route);
            let (kind, message) = self.interrupt_record(interrupt);
            warn!(phase = ?phase, "{}; generating from best context", message);
            state.log_error(phase, kind, message);
        }

        // FUSE: pick the best graded round, then rerank within the deadline.
        state.enter(WorkflowPhase::Fuse);
        let (mut context, grade) = select_context(&state);
        let fused_items = std::mem::take(&mut context.items);
        let rerank = self
            .retriever
            .fuser()
            .rerank(state.original_query().raw(), fused_items.clone());
        let reranked = tokio::select! {
            biased;
            result = tokio::time::timeout_at(deadline, rerank) => {
                result.map_err(|_| Interrupt::Deadline)
            }
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        };
        match reranked {
            Ok((items, rerank_error)) => {
                context.items = items;
                if let Some(e) = rerank_error {
                    debug!(error = %e, "Rerank skipped");
                }
            }
            Err(stopped) => {
                context.items = fused_items;
                if interrupt.is_none() {
                    let (kind, message) = self.interrupt_record(stopped);
                    warn!("{} during rerank; keeping fused order", message);
                    state.log_error(WorkflowPhase::Fuse, kind, message);
                    interrupt = Some(stopped);
                }
            }
        }

        let retrieval_skipped = state
            .decision()
            .map(|d| d.strategy == Strategy::NoRetrieval)
            .unwrap_or(false);
        let low_confidence = interrupt.is_some()
            || match &grade {
                Some(graded) => graded.needs_refinement,
                None => !retrieval_skipped,
            };

        // GENERATE
        state.enter(WorkflowPhase::Generate);
        let answer = if self.config.generate_answer && !cancel.is_cancelled() {
            self.generate(&mut state, &context).await
        } else {
            None
        };

        state.enter(WorkflowPhase::Done);
        info!(
            items = context.len(),
            retries = state.retry_count(),
            low_confidence,
            partial = context.partial,
            "Orchestration finished"
        );

        OrchestrationOutcome {
            request_id: state.request_id(),
            answer_context: context,
            tools_used: state.tools_used().to_vec(),
            low_confidence,
            routing_trace: state.routing_trace().to_vec(),
            answer,
            quality_score: grade.map(|g| g.quality_score),
            retry_count: state.retry_count(),
            error_log: state.error_log().to_vec(),
            phases: state.phases().to_vec(),
        }
    }

    /// ROUTE -> RETRIEVE -> GRADE -> REWRITE, until a round is acceptable,
    /// retries run out, or a round fails outright.
    async fn run_rounds(&self, state: &mut WorkflowState, cancel: &CancellationToken) {
        loop {
            state.enter(WorkflowPhase::Route);
            let routed = self.router.resolve(state.query()).await;
            if let Some(reason) = routed.ambiguity {
                state.log_error(WorkflowPhase::Route, ErrorKind::ClassificationAmbiguous, reason);
            }
            let strategy = routed.decision.strategy;
            info!(
                strategy = %strategy,
                confidence = routed.decision.confidence,
                reasoning = %routed.decision.reasoning,
                "Routed query"
            );
            state.set_decision(routed.decision);

            state.enter(WorkflowPhase::Retrieve);
            let fused = self.retriever.execute(state.query(), strategy, cancel).await;
            log_source_failures(state, &fused);
            let all_failed = fused.all_sources_failed();
            state.set_fused(fused);

            if strategy == Strategy::NoRetrieval {
                return;
            }
            if all_failed {
                warn!("Every retrieval source failed");
                state.enter(WorkflowPhase::Error);
                return;
            }

            state.enter(WorkflowPhase::Grade);
            let graded = self.grade(state).await;
            let needs_refinement = graded.needs_refinement;
            state.set_graded(graded);

            if !needs_refinement {
                return;
            }
            if !state.can_retry() {
                info!(retries = state.retry_count(), "Retries exhausted below threshold");
                return;
            }

            state.enter(WorkflowPhase::Rewrite);
            match self.rewriter.rewrite(state).await {
                Ok(true) => continue,
                Ok(false) => return,
                Err(e) => {
                    warn!(error = %e, "Rewrite failed, keeping best context");
                    state.log_error(WorkflowPhase::Rewrite, ErrorKind::RewriteFailure, e.to_string());
                    return;
                }
            }
        }
    }

    fn interrupt_record(&self, interrupt: Interrupt) -> (ErrorKind, String) {
        match interrupt {
            Interrupt::Deadline => (
                ErrorKind::DeadlineExceeded,
                format!("deadline of {:?} exceeded", self.config.deadline),
            ),
            Interrupt::Cancelled => (ErrorKind::Cancelled, "cancelled by caller".to_string()),
        }
    }

    async fn grade(&self, state: &mut WorkflowState) -> GradedContext {
        let result = match state.fused() {
            Some(fused) => self.grader.grade(state.original_query().raw(), fused).await,
            None => Ok(GradedContext::new(0.0, self.grader.threshold(), "no context retrieved")),
        };

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Grading failed, assuming acceptable");
            state.log_error(WorkflowPhase::Grade, ErrorKind::GradingFailure, e.to_string());
            GradedContext::assumed_acceptable(self.grader.threshold(), e.to_string())
        })
    }

    async fn generate(&self, state: &mut WorkflowState, context: &FusedResult) -> Option<String> {
        let prompt = format_answer_prompt(state.original_query().raw(), &context.items);
        let timeout = self.config.generation_timeout;

        let result = match tokio::time::timeout(timeout, self.model.complete(&prompt)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Model(
                format!("generation timed out after {:?}", timeout).into(),
            )),
        };

        match result {
            Ok(answer) => Some(answer),
            Err(e) => {
                warn!(error = %e, "Answer generation failed");
                state.log_error(
                    WorkflowPhase::Generate,
                    ErrorKind::GenerationFailure,
                    e.to_string(),
                );
                None
            }
        }
    }
}

/// Best graded round, or the last ungraded result when nothing was graded.
fn select_context(state: &WorkflowState) -> (FusedResult, Option<GradedContext>) {
    match state.best() {
        Some((fused, graded)) => (fused.clone(), Some(graded.clone())),
        None => (state.fused().cloned().unwrap_or_default(), None),
    }
}

fn log_source_failures(state: &mut WorkflowState, fused: &FusedResult) {
    for report in &fused.sources {
        let seed = report
            .seed
            .as_deref()
            .map(|s| format!(" (seed {})", s))
            .unwrap_or_default();
        match &report.outcome {
            SourceOutcome::Ok { .. } => {}
            SourceOutcome::TimedOut => state.log_error(
                WorkflowPhase::Retrieve,
                ErrorKind::RetrievalTimeout,
                format!("{}{} timed out", report.tool, seed),
            ),
            SourceOutcome::Failed { message } => state.log_error(
                WorkflowPhase::Retrieve,
                ErrorKind::RetrievalBackendError,
                format!("{}{}: {}", report.tool, seed, message),
            ),
        }
    }
}
