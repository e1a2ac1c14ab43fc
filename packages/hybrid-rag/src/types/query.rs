//! Queries and known-entity detection.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// A known entity detected in query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Stable id in the knowledge store
    pub id: String,

    /// The text as it appeared in the query
    pub surface: String,
}

impl Entity {
    pub fn new(id: impl Into<String>, surface: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            surface: surface.into(),
        }
    }
}

/// Lookup table of known entities and their surface forms.
///
/// Built once at startup and shared read-only between workflows.
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    /// (pattern, entity id), longest surface form first
    patterns: Vec<(Regex, String)>,
}

impl EntityCatalog {
    /// An empty catalog (detects nothing).
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Build a catalog from `(entity_id, surface_forms)` pairs.
    ///
    /// Matching is case-insensitive and respects word boundaries.
    pub fn new<I, S, F>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<F>)>,
        S: Into<String>,
        F: Into<String>,
    {
        let mut surfaces: Vec<(String, String)> = Vec::new();
        for (id, forms) in entries {
            let id = id.into();
            for form in forms {
                let form = form.into().trim().to_lowercase();
                if !form.is_empty() {
                    surfaces.push((form, id.clone()));
                }
            }
        }

        // Longest first so "walt disney" beats "disney"; stable on ties.
        surfaces.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

        let mut patterns = Vec::with_capacity(surfaces.len());
        for (form, id) in surfaces {
            let pattern = surface_pattern(&form);
            let regex = Regex::new(&pattern).map_err(|e| RagError::Config(Box::new(e)))?;
            patterns.push((regex, id));
        }

        Ok(Self { patterns })
    }

    /// Number of surface forms known.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Detect known entities in `text`.
    ///
    /// Returns one entry per entity id, ordered by first appearance in the
    /// text. Overlapping matches are resolved in favor of longer surfaces.
    pub fn detect(&self, text: &str) -> Vec<Entity> {
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut found: Vec<(usize, Entity)> = Vec::new();

        for (regex, id) in &self.patterns {
            for m in regex.find_iter(text) {
                let (start, end) = (m.start(), m.end());
                if claimed.iter().any(|&(s, e)| start < e && s < end) {
                    continue;
                }
                claimed.push((start, end));
                found.push((start, Entity::new(id.clone(), m.as_str())));
            }
        }

        found.sort_by_key(|(start, _)| *start);

        let mut seen = HashSet::new();
        found
            .into_iter()
            .filter(|(_, entity)| seen.insert(entity.id.clone()))
            .map(|(_, entity)| entity)
            .collect()
    }
}

impl Default for EntityCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

/// Case-insensitive pattern with word boundaries on word-character edges.
fn surface_pattern(form: &str) -> String {
    let is_word = |c: Option<char>| c.map(|c| c.is_alphanumeric() || c == '_').unwrap_or(false);
    let lead = if is_word(form.chars().next()) { r"\b" } else { "" };
    let trail = if is_word(form.chars().last()) { r"\b" } else { "" };
    format!("(?i){}{}{}", lead, regex::escape(form), trail)
}

/// An incoming natural-language query.
///
/// Immutable once created; a rewrite produces a new `Query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    raw: String,
    normalized: String,
    entities: Vec<Entity>,
    prior_turn: Option<String>,
}

impl Query {
    /// Create a query with no entity detection.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self {
            raw,
            normalized,
            entities: Vec::new(),
            prior_turn: None,
        }
    }

    /// Create a query, detecting known entities with `catalog`.
    pub fn with_catalog(raw: impl Into<String>, catalog: &EntityCatalog) -> Self {
        let mut query = Self::new(raw);
        query.entities = catalog.detect(&query.raw);
        query
    }

    /// Create a query with entities already resolved by the caller.
    pub fn with_entities(raw: impl Into<String>, entities: Vec<Entity>) -> Self {
        let mut query = Self::new(raw);
        query.entities = entities;
        query
    }

    /// Attach a reference to the previous conversation turn.
    pub fn with_prior_turn(mut self, prior_turn: impl Into<String>) -> Self {
        self.prior_turn = Some(prior_turn.into());
        self
    }

    /// Derive a reformulated query, keeping the prior-turn reference.
    pub fn reformulated(&self, text: impl Into<String>, catalog: &EntityCatalog) -> Self {
        let mut query = Self::with_catalog(text, catalog);
        query.prior_turn = self.prior_turn.clone();
        query
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lower-cased, trimmed text.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn prior_turn(&self) -> Option<&str> {
        self.prior_turn.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}
