//! Context grading via the language model.
//!
//! Raw model text never drives control flow directly: replies are parsed into
//! a bounded score, and anything unparseable is an error the caller turns
//! into the assume-acceptable default.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::pipeline::prompts::format_grade_prompt;
use crate::traits::model::LanguageModel;
use crate::types::{
    retrieval::FusedResult,
    routing::clamp_unit,
    workflow::GradedContext,
};

/// Grading reply the model is asked to produce.
#[derive(Debug, Deserialize)]
struct GradeVerdict {
    score: f32,
    #[serde(default)]
    justification: String,
}

/// Scores retrieved context for relevance to the query.
#[derive(Clone)]
pub struct ContextGrader {
    model: Arc<dyn LanguageModel>,
    threshold: f32,
    timeout: Duration,
}

impl ContextGrader {
    pub fn new(model: Arc<dyn LanguageModel>, threshold: f32) -> Self {
        Self {
            model,
            threshold,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Grade `fused` against `query`.
    ///
    /// An empty result scores 0 without a model call. Errors cover model
    /// failure, timeout, and replies with no usable score.
    pub async fn grade(&self, query: &str, fused: &FusedResult) -> Result<GradedContext> {
        if fused.is_empty() {
            return Ok(GradedContext::new(0.0, self.threshold, "no context retrieved"));
        }

        let prompt = format_grade_prompt(query, &fused.items);
        let reply = tokio::time::timeout(self.timeout, self.model.complete(&prompt))
            .await
            .map_err(|_| {
                RagError::Model(format!("grading timed out after {:?}", self.timeout).into())
            })??;

        let (score, justification) = parse_grade(&reply).ok_or_else(|| {
            RagError::Model(format!("no score in grading reply: {}", truncate(&reply, 80)).into())
        })?;

        debug!(score, threshold = self.threshold, "Graded context");
        Ok(GradedContext::new(score, self.threshold, justification))
    }
}

/// Parse a grading reply into a score in [0, 1] and a justification.
///
/// Accepts the JSON verdict (optionally inside a markdown code fence), then
/// falls back to the first number in the text. `N/M`, `N out of M` and `N%`
/// are read as ratios. Any other score outside [0, 1] is rejected rather than
/// clamped.
pub fn parse_grade(reply: &str) -> Option<(f32, String)> {
    let trimmed = reply.trim();
    let verdict: Option<GradeVerdict> = serde_json::from_str(trimmed).ok().or_else(|| {
        let json_str = trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        serde_json::from_str(json_str).ok()
    });

    if let Some(verdict) = verdict {
        return unit_score(verdict.score).map(|score| (score, verdict.justification));
    }

    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let number = NUMBER
        .get_or_init(|| {
            Regex::new(r"(?i)(-?\d+(?:\.\d+)?)(?:\s*(?:/|out\s+of)\s*(\d+(?:\.\d+)?)|\s*(%))?").ok()
        })
        .as_ref()?;

    let caps = number.captures(trimmed)?;
    let value: f32 = caps.get(1)?.as_str().parse().ok()?;
    let score = if let Some(scale) = caps.get(2) {
        let scale: f32 = scale.as_str().parse().ok()?;
        if scale <= 0.0 {
            return None;
        }
        value / scale
    } else if caps.get(3).is_some() {
        value / 100.0
    } else {
        value
    };

    unit_score(score).map(|score| (score, truncate(trimmed, 200)))
}

fn unit_score(score: f32) -> Option<f32> {
    (score.is_finite() && (0.0..=1.0).contains(&score)).then(|| clamp_unit(score))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
