//! Configuration types for routing, retrieval, and the workflow.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration for a full orchestration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of query rewrites per request.
    ///
    /// Latency is bounded by `(max_retries + 1)` retrieval rounds.
    /// Default: 2.
    pub max_retries: u32,

    /// Grades below this value trigger a rewrite.
    ///
    /// Also used as the assumed grade when grading fails. Default: 0.7.
    pub quality_threshold: f32,

    /// Global wall-clock deadline for the whole state machine.
    ///
    /// On breach the workflow jumps straight to generation. Default: 30s.
    #[serde(with = "duration_ms")]
    pub deadline: Duration,

    /// Bound on the final answer-generation call. Default: 15s.
    #[serde(with = "duration_ms")]
    pub generation_timeout: Duration,

    /// Whether the GENERATE state asks the model for an answer.
    ///
    /// When false the outcome carries context only. Default: true.
    pub generate_answer: bool,

    pub retrieval: RetrievalConfig,

    pub fusion: FusionConfig,

    pub semantic: SemanticConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            quality_threshold: 0.7,
            deadline: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(15),
            generate_answer: true,
            retrieval: RetrievalConfig::default(),
            fusion: FusionConfig::default(),
            semantic: SemanticConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rewrite budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the grading threshold.
    pub fn with_quality_threshold(mut self, threshold: f32) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// Set the global deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_generate_answer(mut self, generate: bool) -> Self {
        self.generate_answer = generate;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_fusion(mut self, fusion: FusionConfig) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_semantic(mut self, semantic: SemanticConfig) -> Self {
        self.semantic = semantic;
        self
    }

    /// Reject values the workflow cannot honor.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(config_error(format!(
                "quality_threshold must be within [0, 1], got {}",
                self.quality_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.semantic.min_confidence) {
            return Err(config_error(format!(
                "semantic.min_confidence must be within [0, 1], got {}",
                self.semantic.min_confidence
            )));
        }
        if self.deadline.is_zero() {
            return Err(config_error("deadline must be non-zero"));
        }
        if self.retrieval.top_k == 0 {
            return Err(config_error("retrieval.top_k must be at least 1"));
        }
        if self.fusion.rrf_k == 0 {
            return Err(config_error("fusion.rrf_k must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration for the retrieval orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Items requested from the vector collaborator. Default: 10.
    pub top_k: usize,

    /// Timeout for any single collaborator call. Default: 5s.
    #[serde(with = "duration_ms")]
    pub source_timeout: Duration,

    /// Joint wait for both sides of a parallel hybrid. Default: 8s.
    #[serde(with = "duration_ms")]
    pub joint_timeout: Duration,

    /// Vector results scanned for entities in a sequential hybrid. Default: 5.
    pub sequential_seed_results: usize,

    /// Entities traversed in a sequential hybrid. Default: 5.
    pub max_seed_entities: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            source_timeout: Duration::from_secs(5),
            joint_timeout: Duration::from_secs(8),
            sequential_seed_results: 5,
            max_seed_entities: 5,
        }
    }
}

impl RetrievalConfig {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn with_joint_timeout(mut self, timeout: Duration) -> Self {
        self.joint_timeout = timeout;
        self
    }
}

/// Configuration for rank fusion and reranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// RRF smoothing constant. Default: 60.
    pub rrf_k: u32,

    /// Rerank only the first N fused items; `None` disables reranking.
    pub rerank_top_n: Option<usize>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            rerank_top_n: None,
        }
    }
}

impl FusionConfig {
    pub fn with_rerank_top_n(mut self, n: usize) -> Self {
        self.rerank_top_n = Some(n);
        self
    }
}

/// Configuration for the embedding-similarity router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Best similarity below this falls back to VECTOR. Default: 0.5.
    pub min_confidence: f32,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

fn config_error(message: impl Into<String>) -> RagError {
    RagError::Config(message.into().into())
}

/// Serialize `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
