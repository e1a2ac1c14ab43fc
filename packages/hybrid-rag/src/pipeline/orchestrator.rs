//! Strategy execution against the vector and graph collaborators.
//!
//! This is the error boundary of the library: every collaborator failure,
//! timeout, or cancellation is converted into a [`SourceReport`] and a
//! zero-item contribution. Nothing a backend raises propagates past here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult, Result};
use crate::pipeline::fusion::{RankedList, ResultFuser};
use crate::traits::backend::{EntityExtractor, GraphSearch, VectorSearch};
use crate::types::{
    config::RetrievalConfig,
    query::Query,
    retrieval::{FusedResult, GraphQuery, Origin, RetrievalItem, SearchHit, SourceReport, Tool},
    routing::Strategy,
};

/// One collaborator call: its report plus whatever items it produced.
struct SourceCall {
    report: SourceReport,
    items: Vec<RetrievalItem>,
}

/// Executes retrieval strategies and fuses their output.
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    vector: Arc<dyn VectorSearch>,
    graph: Arc<dyn GraphSearch>,
    extractor: Arc<dyn EntityExtractor>,
    fuser: ResultFuser,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        vector: Arc<dyn VectorSearch>,
        graph: Arc<dyn GraphSearch>,
        extractor: Arc<dyn EntityExtractor>,
    ) -> Self {
        Self {
            vector,
            graph,
            extractor,
            fuser: ResultFuser::default(),
            config: RetrievalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fuser(mut self, fuser: ResultFuser) -> Self {
        self.fuser = fuser;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn fuser(&self) -> &ResultFuser {
        &self.fuser
    }

    /// Run `strategy` for `query` and return fused results.
    pub async fn retrieve(&self, query: &Query, strategy: Strategy) -> FusedResult {
        self.execute(query, strategy, &CancellationToken::new()).await
    }

    /// Like [`retrieve`](Self::retrieve), abandoning pending calls on `cancel`.
    pub async fn execute(
        &self,
        query: &Query,
        strategy: Strategy,
        cancel: &CancellationToken,
    ) -> FusedResult {
        debug!(strategy = %strategy, query = %query.raw(), "Executing retrieval");

        match strategy {
            Strategy::Vector => {
                let call = self.call_vector(query, self.config.source_timeout, cancel).await;
                self.fuse(vec![call], None)
            }
            Strategy::Graph => {
                let call = self
                    .call_graph(
                        GraphQuery::text(query.raw().trim()),
                        self.config.source_timeout,
                        cancel,
                    )
                    .await;
                self.fuse(vec![call], None)
            }
            Strategy::HybridSequential => self.hybrid_sequential(query, cancel).await,
            Strategy::HybridParallel => self.hybrid_parallel(query, cancel).await,
            Strategy::NoRetrieval => FusedResult::empty(),
        }
    }

    /// Vector first, then one graph traversal per extracted entity.
    async fn hybrid_sequential(&self, query: &Query, cancel: &CancellationToken) -> FusedResult {
        let vector = self.call_vector(query, self.config.source_timeout, cancel).await;

        let mut reports = Vec::new();
        let mut entities: Vec<String> = Vec::new();
        for item in vector.items.iter().take(self.config.sequential_seed_results) {
            if entities.len() >= self.config.max_seed_entities || cancel.is_cancelled() {
                break;
            }
            match self.extract(&item.content, cancel).await {
                Ok(found) => {
                    reports.push(SourceReport::ok(Tool::EntityExtraction, found.len()));
                    for id in found {
                        if !entities.contains(&id) {
                            entities.push(id);
                        }
                    }
                }
                Err(e) => {
                    warn!(item = %item.id, error = %e, "Entity extraction failed");
                    reports.push(SourceReport::failed(Tool::EntityExtraction, e.to_string()));
                }
            }
        }

        if entities.is_empty() {
            entities = query.entities().iter().map(|e| e.id.clone()).collect();
            if !entities.is_empty() {
                debug!(count = entities.len(), "No entities extracted, seeding from query entities");
            }
        }
        entities.truncate(self.config.max_seed_entities);

        let mut calls = vec![vector];
        for entity_id in &entities {
            let graph_query = GraphQuery::seeded(entity_id.clone(), query.raw().trim());
            let mut call = self
                .call_graph(graph_query, self.config.source_timeout, cancel)
                .await;
            call.report = call.report.with_seed(entity_id.clone());
            calls.push(call);
        }

        let mut result = self.fuse(calls, Some(entities));
        // Keep reports in call order: vector, extraction, graph.
        let graph_reports = result.sources.split_off(1);
        result.sources.extend(reports);
        result.sources.extend(graph_reports);
        result.partial = result.sources.iter().any(|s| !s.succeeded());
        result
    }

    /// Vector and graph concurrently, bounded by the joint timeout.
    async fn hybrid_parallel(&self, query: &Query, cancel: &CancellationToken) -> FusedResult {
        // Both calls start together, so capping each at the joint timeout
        // bounds the join without discarding a side that already finished.
        let limit = self.config.source_timeout.min(self.config.joint_timeout);

        let (vector, graph) = join(
            self.call_vector(query, limit, cancel),
            self.call_graph(GraphQuery::text(query.raw().trim()), limit, cancel),
        )
        .await;

        self.fuse(vec![vector, graph], None)
    }

    fn fuse(&self, calls: Vec<SourceCall>, seed_entities: Option<Vec<String>>) -> FusedResult {
        let mut sources = Vec::with_capacity(calls.len());
        let mut lists = Vec::with_capacity(calls.len());
        for call in calls {
            if let Some(origin) = call.report.tool.origin() {
                lists.push(RankedList::new(origin, call.items));
            }
            sources.push(call.report);
        }

        FusedResult {
            items: self.fuser.fuse(&lists),
            partial: sources.iter().any(|s| !s.succeeded()),
            sources,
            seed_entities,
        }
    }

    async fn call_vector(
        &self,
        query: &Query,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> SourceCall {
        let result = guarded(
            Origin::Vector,
            limit,
            cancel,
            self.vector.vector_search(query.raw().trim(), self.config.top_k),
        )
        .await;
        into_call(Origin::Vector, result)
    }

    async fn call_graph(
        &self,
        graph_query: GraphQuery,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> SourceCall {
        let result = guarded(
            Origin::Graph,
            limit,
            cancel,
            self.graph.graph_search(&graph_query),
        )
        .await;
        into_call(Origin::Graph, result)
    }

    async fn extract(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let limit = self.config.source_timeout;
        tokio::select! {
            _ = cancel.cancelled() => Err(crate::error::RagError::Cancelled),
            result = tokio::time::timeout(limit, self.extractor.extract_entities(text)) => {
                result.unwrap_or_else(|_| {
                    Err(crate::error::RagError::Model(
                        format!("entity extraction timed out after {:?}", limit).into(),
                    ))
                })
            }
        }
    }
}

/// Apply the per-source timeout and cancellation to a backend call.
async fn guarded<F>(
    origin: Origin,
    limit: Duration,
    cancel: &CancellationToken,
    call: F,
) -> BackendResult<Vec<SearchHit>>
where
    F: Future<Output = BackendResult<Vec<SearchHit>>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(BackendError::Other {
            origin,
            message: "cancelled".to_string(),
        }),
        result = tokio::time::timeout(limit, call) => {
            result.unwrap_or(Err(BackendError::Timeout { origin, after: limit }))
        }
    }
}

fn into_call(origin: Origin, result: BackendResult<Vec<SearchHit>>) -> SourceCall {
    match result {
        Ok(hits) => {
            let items: Vec<RetrievalItem> = hits.into_iter().map(|h| h.into_item(origin)).collect();
            debug!(origin = %origin, items = items.len(), "Source returned");
            SourceCall {
                report: SourceReport::ok(origin, items.len()),
                items,
            }
        }
        Err(e) if e.is_timeout() => {
            warn!(origin = %origin, error = %e, "Source timed out");
            SourceCall {
                report: SourceReport::timed_out(origin),
                items: Vec::new(),
            }
        }
        Err(e) => {
            warn!(origin = %origin, error = %e, "Source failed");
            SourceCall {
                report: SourceReport::failed(origin, e.to_string()),
                items: Vec::new(),
            }
        }
    }
}
