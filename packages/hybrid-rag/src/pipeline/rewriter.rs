//! Query reformulation between retrieval rounds.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::pipeline::prompts::format_rewrite_prompt;
use crate::traits::model::LanguageModel;
use crate::types::{query::EntityCatalog, workflow::WorkflowState};

/// Longest rewrite accepted, in characters.
pub const MAX_REWRITE_CHARS: usize = 512;

/// Labels models like to prefix their single-line answers with.
const LABELS: [&str; 4] = ["rewritten query:", "query:", "rewrite:", "rewritten:"];

/// Produces a more specific query when a round graded below threshold.
#[derive(Clone)]
pub struct QueryRewriter {
    model: Arc<dyn LanguageModel>,
    catalog: Arc<EntityCatalog>,
    timeout: Duration,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            catalog: Arc::new(EntityCatalog::empty()),
            timeout: Duration::from_secs(15),
        }
    }

    /// Detect known entities in rewritten queries.
    pub fn with_catalog(mut self, catalog: Arc<EntityCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rewrite the current query and start the next round.
    ///
    /// Returns `Ok(false)` without calling the model when the last grade did
    /// not ask for refinement or retries are spent. An error leaves the state
    /// untouched and consumes no retry.
    pub async fn rewrite(&self, state: &mut WorkflowState) -> Result<bool> {
        let needs_refinement = state.graded().map(|g| g.needs_refinement).unwrap_or(false);
        if !needs_refinement || !state.can_retry() {
            return Ok(false);
        }

        let justification = state
            .graded()
            .map(|g| g.justification.clone())
            .unwrap_or_default();
        let current = state.query();
        let prompt = format_rewrite_prompt(
            state.original_query().raw(),
            current.raw(),
            current.prior_turn(),
            &justification,
        );

        let reply = tokio::time::timeout(self.timeout, self.model.complete(&prompt))
            .await
            .map_err(|_| {
                RagError::Model(format!("rewrite timed out after {:?}", self.timeout).into())
            })??;

        let text = parse_rewrite(&reply, current.raw())
            .ok_or_else(|| RagError::Model("rewrite was empty or unchanged".into()))?;

        debug!(from = %current.raw(), to = %text, "Rewrote query");
        let next = current.reformulated(text, &self.catalog);
        let started = state.begin_retry(next);
        if started {
            info!(retry = state.retry_count(), "Starting retrieval retry");
        }
        Ok(started)
    }
}

/// Validate a rewrite reply against the current query text.
///
/// Takes the first non-empty line, strips labels and surrounding quotes, and
/// caps the length. `None` when nothing usable or nothing new remains.
pub fn parse_rewrite(reply: &str, current: &str) -> Option<String> {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))?;

    let mut text = line;
    let lower = text.to_lowercase();
    if let Some(label) = LABELS.iter().find(|l| lower.starts_with(*l)) {
        if let Some(rest) = text.get(label.len()..) {
            text = rest.trim();
        }
    }
    let text = text
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim();

    let text: String = text.chars().take(MAX_REWRITE_CHARS).collect();
    if text.is_empty() || text.eq_ignore_ascii_case(current.trim()) {
        return None;
    }
    Some(text)
}
