//! Query Routing and Hybrid Retrieval Orchestration
//!
//! Decides, per incoming question, which retrieval path to take (vector
//! similarity, structured graph traversal, a sequential or parallel hybrid of
//! both, or none), executes it against pluggable backends, fuses the results
//! with Reciprocal Rank Fusion, grades them, and loops through a bounded
//! rewrite cycle before generating an answer.
//!
//! # Design Philosophy
//!
//! - Deterministic routing: rules first, then known entities, then embeddings
//! - A closed set of strategies, matched exhaustively
//! - Backend failures degrade results, never the request
//! - Every model reply is parsed and bounded before it steers anything
//! - Auditable: each outcome lists the routes taken and tools exercised
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hybrid_rag::{
//!     Collaborators, OrchestratorConfig, QueryClassifier, QueryRouter, RuleSet,
//!     WorkflowController,
//! };
//! use hybrid_rag::testing::{
//!     MockEntityExtractor, MockGraphSearch, MockLanguageModel, MockVectorSearch,
//! };
//!
//! let rules = Arc::new(RuleSet::standard()?);
//! let router = QueryRouter::new(QueryClassifier::new(rules));
//!
//! let controller = WorkflowController::new(
//!     router,
//!     Collaborators {
//!         vector: Arc::new(MockVectorSearch::new()),
//!         graph: Arc::new(MockGraphSearch::new()),
//!         extractor: Arc::new(MockEntityExtractor::new()),
//!         model: Arc::new(MockLanguageModel::new()),
//!     },
//!     OrchestratorConfig::default(),
//! )?;
//!
//! let outcome = controller
//!     .orchestrate(controller.query("Show me the relationship between Disney and EA"))
//!     .await?;
//! println!("{:?} via {:?}", outcome.routing_trace, outcome.tools_used);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator contracts (search backends, embeddings, completions)
//! - [`types`] - Queries, routing decisions, retrieval results, workflow state
//! - [`pipeline`] - Routing, retrieval, fusion, grading, and the workflow controller
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{BackendError, RagError, Result};
pub use traits::{
    backend::{EntityExtractor, GraphSearch, VectorSearch},
    model::{Embedder, LanguageModel, RelevanceScorer},
};
pub use types::{
    config::{FusionConfig, OrchestratorConfig, RetrievalConfig, SemanticConfig},
    query::{Entity, EntityCatalog, Query},
    retrieval::{
        FusedItem, FusedResult, GraphQuery, Origin, RetrievalItem, SearchHit, SourceOutcome,
        SourceReport, Tool,
    },
    routing::{DecisionSource, RoutingDecision, Strategy},
    workflow::{
        ErrorKind, ErrorRecord, GradedContext, OrchestrationOutcome, WorkflowPhase, WorkflowState,
    },
};

// Re-export pipeline components
pub use pipeline::{
    // Routing
    ExemplarIndex, QueryClassifier, QueryRouter, RoutingRule, RuleSet, SemanticRoute,
    SemanticRouter,
    // Retrieval
    reciprocal_rank_fusion, KeywordOverlapScorer, ResultFuser, RetrievalOrchestrator,
    // Refinement
    ContextGrader, QueryRewriter,
    // Workflow
    Collaborators, WorkflowController,
};

// Re-export testing utilities
pub use testing::{
    MockEmbedder, MockEntityExtractor, MockGraphSearch, MockLanguageModel, MockVectorSearch,
};
