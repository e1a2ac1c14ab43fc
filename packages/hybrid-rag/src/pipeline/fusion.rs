//! Reciprocal Rank Fusion and optional reranking.
//!
//! RRF: an item at zero-based rank `r` in a list contributes `1 / (k + r + 1)`.
//! Contributions from different lists are summed. Ordering is by descending
//! sum; ties keep first-seen order, and lists are fed vector-first.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::model::RelevanceScorer;
use crate::types::{
    config::FusionConfig,
    retrieval::{FusedItem, Origin, RetrievalItem},
};

/// One ranked list from a single source call, best first.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub origin: Origin,
    pub items: Vec<RetrievalItem>,
}

impl RankedList {
    pub fn new(origin: Origin, items: Vec<RetrievalItem>) -> Self {
        Self { origin, items }
    }
}

/// Rank fusion plus an optional, order-only rerank step.
#[derive(Clone, Default)]
pub struct ResultFuser {
    config: FusionConfig,
    scorer: Option<Arc<dyn RelevanceScorer>>,
}

impl ResultFuser {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            scorer: None,
        }
    }

    /// Enable reranking with `scorer` (still requires `rerank_top_n`).
    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse ranked lists with RRF.
    pub fn fuse(&self, lists: &[RankedList]) -> Vec<FusedItem> {
        reciprocal_rank_fusion(lists, self.config.rrf_k)
    }

    /// Reorder the top N items by pairwise relevance to `query`.
    ///
    /// Never adds or drops items. If scoring fails the input order is kept
    /// and the error is returned alongside it.
    pub async fn rerank(
        &self,
        query: &str,
        mut items: Vec<FusedItem>,
    ) -> (Vec<FusedItem>, Option<String>) {
        let (Some(scorer), Some(top_n)) = (&self.scorer, self.config.rerank_top_n) else {
            return (items, None);
        };

        let n = top_n.min(items.len());
        if n < 2 {
            return (items, None);
        }

        let mut scores = Vec::with_capacity(n);
        for fused in &items[..n] {
            match scorer.score(query, &fused.item.content).await {
                Ok(score) => scores.push(if score.is_nan() { 0.0 } else { score }),
                Err(e) => {
                    warn!(error = %e, "Rerank scoring failed, keeping fused order");
                    return (items, Some(e.to_string()));
                }
            }
        }

        let mut head: Vec<(f32, FusedItem)> = scores.into_iter().zip(items.drain(..n)).collect();
        head.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut reranked: Vec<FusedItem> = head
            .into_iter()
            .map(|(score, mut fused)| {
                fused.rerank_score = Some(score);
                fused
            })
            .collect();
        reranked.extend(items);

        debug!(reranked = n, "Reranked fused items");
        (reranked, None)
    }
}

/// Reciprocal Rank Fusion over any number of lists.
///
/// Within one list only the first occurrence of an id counts. The kept
/// content is from the first list the item appeared in.
pub fn reciprocal_rank_fusion(lists: &[RankedList], k: u32) -> Vec<FusedItem> {
    let mut fused: IndexMap<String, FusedItem> = IndexMap::new();

    for list in lists {
        let mut seen = HashSet::new();
        for (rank, item) in list.items.iter().enumerate() {
            if !seen.insert(item.id.as_str()) {
                continue;
            }
            let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);

            fused
                .entry(item.id.clone())
                .and_modify(|f| {
                    f.fused_score += contribution;
                    if !f.origins.contains(&list.origin) {
                        f.origins.push(list.origin);
                        f.origins.sort();
                    }
                })
                .or_insert_with(|| FusedItem {
                    item: item.clone(),
                    fused_score: contribution,
                    origins: vec![list.origin],
                    rerank_score: None,
                });
        }
    }

    let mut items: Vec<FusedItem> = fused.into_values().collect();
    // Stable: equal scores keep first-seen order.
    items.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    items
}

/// Lexical relevance: share of query terms present in the content.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordOverlapScorer;

#[async_trait]
impl RelevanceScorer for KeywordOverlapScorer {
    async fn score(&self, query: &str, content: &str) -> Result<f32> {
        Ok(keyword_overlap(query, content))
    }
}

/// Fraction of query terms (longer than two chars) found in `text`.
pub fn keyword_overlap(query: &str, text: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let query_terms: Vec<&str> = query_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .collect();

    if query_terms.is_empty() {
        return 0.0;
    }

    let text_lower = text.to_lowercase();
    let matches = query_terms
        .iter()
        .filter(|term| text_lower.contains(*term))
        .count();

    matches as f32 / query_terms.len() as f32
}
