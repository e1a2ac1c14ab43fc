//! Query routing CLI
//!
//! Prints the routing decision for each argument as one JSON line.
//!
//! ```text
//! route "What is an SLA?" "Compare Disney and Netflix"
//! ```
//!
//! With `OPENAI_API_KEY` set, queries no rule catches go through the
//! embedding-similarity router; without it only rules and known entities apply.

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use hybrid_rag::ai::OpenAI;
use hybrid_rag::{
    EntityCatalog, ExemplarIndex, OrchestratorConfig, Query, QueryClassifier, QueryRouter,
    RuleSet, SemanticConfig, SemanticRoute, SemanticRouter,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI configuration loaded from environment variables
#[derive(Debug)]
struct CliConfig {
    openai_api_key: Option<String>,
    min_confidence: f32,
    entities_path: Option<String>,
}

impl CliConfig {
    fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let config = Self {
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            min_confidence: env::var("HYBRID_RAG_MIN_CONFIDENCE")
                .unwrap_or_else(|_| SemanticConfig::default().min_confidence.to_string())
                .parse()
                .context("HYBRID_RAG_MIN_CONFIDENCE must be a number")?,
            entities_path: env::var("HYBRID_RAG_ENTITIES").ok(),
        };

        OrchestratorConfig::default()
            .with_semantic(SemanticConfig {
                min_confidence: config.min_confidence,
            })
            .validate()
            .context("invalid configuration")?;

        Ok(config)
    }
}

/// One output line.
#[derive(Serialize)]
struct RouteLine<'a> {
    query: &'a str,
    entities: Vec<&'a str>,
    #[serde(flatten)]
    decision: hybrid_rag::RoutingDecision,
    ambiguity: Option<String>,
}

fn load_catalog(path: &str) -> Result<EntityCatalog> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read entity catalog {}", path))?;
    let entries: BTreeMap<String, Vec<String>> =
        serde_json::from_str(&text).context("entity catalog must map ids to surface forms")?;
    EntityCatalog::new(entries).context("invalid entity catalog")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hybrid_rag=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();

    let queries: Vec<String> = env::args().skip(1).collect();
    if queries.is_empty() {
        anyhow::bail!("usage: route <query> [<query> ...]");
    }

    let config = CliConfig::from_env()?;

    let catalog = match &config.entities_path {
        Some(path) => load_catalog(path)?,
        None => EntityCatalog::empty(),
    };
    tracing::info!(surface_forms = catalog.len(), "Loaded entity catalog");

    let rules = Arc::new(RuleSet::standard().context("failed to compile routing rules")?);
    let mut router = QueryRouter::new(QueryClassifier::new(rules));

    match &config.openai_api_key {
        Some(key) => {
            let model = Arc::new(OpenAI::new(key.clone()));
            let index = ExemplarIndex::build(SemanticRoute::standard(), model.as_ref())
                .await
                .context("failed to embed routing exemplars")?;
            tracing::info!(exemplars = index.len(), "Semantic routing enabled");
            router = router.with_semantic(SemanticRouter::new(
                Arc::new(index),
                model,
                config.min_confidence,
            ));
        }
        None => tracing::warn!("OPENAI_API_KEY not set, semantic routing disabled"),
    }

    for raw in &queries {
        let query = Query::with_catalog(raw.as_str(), &catalog);
        let routed = router.resolve(&query).await;
        let line = RouteLine {
            query: raw,
            entities: query.entities().iter().map(|e| e.id.as_str()).collect(),
            decision: routed.decision,
            ambiguity: routed.ambiguity,
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    Ok(())
}
