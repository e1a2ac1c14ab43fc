//! Integration tests for the full routing and retrieval workflow.
//!
//! These tests drive `WorkflowController` end to end with mock collaborators:
//! 1. Route (rules, entities, semantic fallback)
//! 2. Retrieve with each strategy
//! 3. Grade and rewrite
//! 4. Fuse and generate

use std::sync::Arc;
use std::time::Duration;

use hybrid_rag::{
    testing::{MockEmbedder, MockEntityExtractor, MockGraphSearch, MockLanguageModel, MockVectorSearch},
    Collaborators, DecisionSource, EntityCatalog, ErrorKind, ExemplarIndex, Origin,
    OrchestratorConfig, QueryClassifier, QueryRouter, RetrievalConfig, RuleSet, SearchHit,
    SemanticRoute, SemanticRouter, Strategy, WorkflowController, WorkflowPhase,
};

const GRADE: &str = "Grade how well";
const REWRITE: &str = "Rewrite this search query";
const ANSWER: &str = "Answer the question";

fn hit(id: &str, content: &str) -> SearchHit {
    SearchHit::new(id, content, 0.8)
}

fn media_catalog() -> Arc<EntityCatalog> {
    Arc::new(
        EntityCatalog::new([
            ("org:disney", vec!["Disney", "Walt Disney"]),
            ("org:ea", vec!["EA", "Electronic Arts"]),
            ("org:netflix", vec!["Netflix"]),
        ])
        .unwrap(),
    )
}

fn rule_router() -> QueryRouter {
    QueryRouter::new(QueryClassifier::new(Arc::new(RuleSet::standard().unwrap())))
}

/// Helper to build a controller over the given mocks.
fn setup_controller(
    vector: &MockVectorSearch,
    graph: &MockGraphSearch,
    extractor: &MockEntityExtractor,
    model: &MockLanguageModel,
    config: OrchestratorConfig,
) -> WorkflowController {
    WorkflowController::new(
        rule_router(),
        Collaborators {
            vector: Arc::new(vector.clone()),
            graph: Arc::new(graph.clone()),
            extractor: Arc::new(extractor.clone()),
            model: Arc::new(model.clone()),
        },
        config,
    )
    .unwrap()
    .with_catalog(media_catalog())
}

fn accepting_model() -> MockLanguageModel {
    MockLanguageModel::new()
        .with_response(GRADE, r#"{"score": 0.9, "justification": "relevant"}"#)
        .with_response(ANSWER, "Here is what the context says.")
}

#[tokio::test]
async fn test_documented_routing_scenarios() {
    let ctl = setup_controller(
        &MockVectorSearch::new(),
        &MockGraphSearch::new(),
        &MockEntityExtractor::new(),
        &MockLanguageModel::new(),
        OrchestratorConfig::default(),
    );

    let cases = [
        ("Show me the relationship between Disney and EA", Strategy::Graph, 0.95),
        ("What is an SLA?", Strategy::Vector, 0.9),
        ("Compare Disney and Netflix", Strategy::HybridParallel, 0.85),
    ];

    for (text, strategy, confidence) in cases {
        let decision = ctl.route(&ctl.query(text)).await;
        assert_eq!(decision.strategy, strategy, "{}", text);
        assert!((decision.confidence - confidence).abs() < f32::EPSILON, "{}", text);
        assert_eq!(decision.source, DecisionSource::Rule);
    }
}

#[tokio::test]
async fn test_two_known_entities_route_sequential() {
    let ctl = setup_controller(
        &MockVectorSearch::new(),
        &MockGraphSearch::new(),
        &MockEntityExtractor::new(),
        &MockLanguageModel::new(),
        OrchestratorConfig::default(),
    );

    let decision = ctl.route(&ctl.query("Disney EA partnership")).await;
    assert_eq!(decision.strategy, Strategy::HybridSequential);
    assert!((decision.confidence - 0.8).abs() < f32::EPSILON);
    assert_eq!(decision.source, DecisionSource::EntityHeuristic);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_graph_timeout_still_generates() {
    let vector = MockVectorSearch::new().with_default_hits(vec![
        hit("v-disney", "Disney streaming subscribers"),
        hit("v-netflix", "Netflix streaming subscribers"),
    ]);
    let graph = MockGraphSearch::new()
        .with_default_hits(vec![hit("g-1", "graph fact")])
        .with_delay(Duration::from_secs(120));
    let model = accepting_model();

    let config = OrchestratorConfig::default();
    let deadline = config.deadline;
    let ctl = setup_controller(&vector, &graph, &MockEntityExtractor::new(), &model, config);

    let started = tokio::time::Instant::now();
    let outcome = ctl
        .orchestrate(ctl.query("Compare Disney and Netflix"))
        .await
        .unwrap();

    assert!(started.elapsed() < deadline);
    assert!(outcome.partial());
    assert!(outcome
        .answer_context
        .items
        .iter()
        .all(|i| i.origins == vec![Origin::Vector]));
    assert_eq!(outcome.answer_context.len(), 2);
    assert!(outcome.phases.contains(&WorkflowPhase::Generate));
    assert!(outcome.answer.is_some());
    assert!(outcome
        .error_log
        .iter()
        .any(|e| e.kind == ErrorKind::RetrievalTimeout && e.message.contains("graph_search")));
    assert_eq!(
        outcome.tools_used,
        vec!["vector_search".to_string(), "graph_search".to_string()]
    );
}

#[tokio::test]
async fn test_sequential_reports_every_tool() {
    let vector = MockVectorSearch::new()
        .with_default_hits(vec![hit("v-1", "Disney licensed Star Wars games to EA")]);
    let extractor = MockEntityExtractor::new().with_entities(
        "Disney licensed Star Wars games to EA",
        vec!["org:disney".into(), "org:ea".into()],
    );
    let graph = MockGraphSearch::new()
        .with_hits("org:disney", vec![hit("g-disney", "Disney owns Lucasfilm")])
        .with_hits("org:ea", vec![hit("g-ea", "EA publishes Star Wars games")]);
    let model = accepting_model();

    let ctl = setup_controller(&vector, &graph, &extractor, &model, OrchestratorConfig::default());
    let outcome = ctl.orchestrate(ctl.query("Disney EA partnership")).await.unwrap();

    assert_eq!(outcome.routing_trace[0].strategy, Strategy::HybridSequential);
    assert_eq!(
        outcome.tools_used,
        vec![
            "vector_search".to_string(),
            "entity_extraction".to_string(),
            "graph_search".to_string(),
        ]
    );
    assert_eq!(outcome.answer_context.len(), 3);
    assert_eq!(
        outcome.answer_context.seed_entities,
        Some(vec!["org:disney".to_string(), "org:ea".to_string()])
    );
    assert!(!outcome.low_confidence);
}

#[tokio::test]
async fn test_rewrite_round_improves_context() {
    let vector = MockVectorSearch::new()
        .with_hits("What is an SLA?", vec![hit("doc-a", "SLA appears in the glossary")])
        .with_hits(
            "Explain service level agreements",
            vec![hit("doc-b", "A service level agreement defines uptime commitments")],
        );
    let model = MockLanguageModel::new()
        .with_responses(
            GRADE,
            vec![
                r#"{"score": 0.3, "justification": "only a glossary mention"}"#,
                r#"{"score": 0.9, "justification": "defines the term"}"#,
            ],
        )
        .with_response(REWRITE, "Explain service level agreements")
        .with_response(ANSWER, "An SLA defines uptime commitments [1].");

    let ctl = setup_controller(
        &vector,
        &MockGraphSearch::new(),
        &MockEntityExtractor::new(),
        &model,
        OrchestratorConfig::default(),
    );
    let outcome = ctl.orchestrate(ctl.query("What is an SLA?")).await.unwrap();

    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.answer_context.ids(), vec!["doc-b"]);
    assert_eq!(outcome.quality_score, Some(0.9));
    assert!(!outcome.low_confidence);
    assert_eq!(outcome.routing_trace.len(), 2);
    assert!(outcome.phases.contains(&WorkflowPhase::Rewrite));

    // Grading and the answer use the original question
    let prompts = model.calls();
    assert!(prompts
        .iter()
        .filter(|p| p.contains(GRADE))
        .all(|p| p.contains("Question: What is an SLA?")));
}

#[tokio::test]
async fn test_best_round_survives_worse_retries() {
    let vector = MockVectorSearch::new()
        .with_hits("What is an SLA?", vec![hit("doc-a", "partial definition")])
        .with_default_hits(vec![hit("doc-z", "unrelated")]);
    let model = MockLanguageModel::new()
        .with_responses(
            GRADE,
            vec![
                r#"{"score": 0.5, "justification": "partial"}"#,
                r#"{"score": 0.2, "justification": "worse"}"#,
            ],
        )
        .with_responses(REWRITE, vec!["Explain SLA terms", "Explain SLA contracts"]);

    let ctl = setup_controller(
        &vector,
        &MockGraphSearch::new(),
        &MockEntityExtractor::new(),
        &model,
        OrchestratorConfig::default().with_generate_answer(false),
    );
    let outcome = ctl.orchestrate(ctl.query("What is an SLA?")).await.unwrap();

    assert_eq!(outcome.retry_count, 2);
    assert!(outcome.low_confidence);
    assert_eq!(outcome.answer_context.ids(), vec!["doc-a"]);
    assert_eq!(outcome.quality_score, Some(0.5));
}

#[tokio::test]
async fn test_semantic_fallback_routes_unmatched_query() {
    let embedder = Arc::new(
        MockEmbedder::new()
            .with_dim(3)
            .with_embedding("who reports to whom", vec![1.0, 0.0, 0.0])
            .with_embedding("reading guide", vec![0.0, 1.0, 0.0])
            .with_embedding("org chart for finance", vec![0.9, 0.1, 0.0]),
    );
    let routes = vec![
        SemanticRoute::new("org_structure", Strategy::Graph, ["who reports to whom"]),
        SemanticRoute::new("documents", Strategy::Vector, ["reading guide"]),
    ];
    let index = ExemplarIndex::build(routes, embedder.as_ref()).await.unwrap();
    let router = rule_router().with_semantic(SemanticRouter::new(Arc::new(index), embedder, 0.5));

    let decision = router
        .route(&hybrid_rag::Query::new("Org chart for finance"))
        .await;
    assert_eq!(decision.strategy, Strategy::Graph);
    assert_eq!(decision.source, DecisionSource::Semantic);
    assert_eq!(decision.reasoning, "semantic:org_structure");
}

#[tokio::test]
async fn test_ambiguous_query_defaults_to_parallel_and_is_logged() {
    let vector = MockVectorSearch::new().with_default_hits(vec![hit("v-1", "something")]);
    let graph = MockGraphSearch::new().with_default_hits(vec![hit("g-1", "something else")]);
    let model = accepting_model();

    let ctl = setup_controller(
        &vector,
        &graph,
        &MockEntityExtractor::new(),
        &model,
        OrchestratorConfig::default(),
    );
    let outcome = ctl.orchestrate(ctl.query("quarterly vibes")).await.unwrap();

    assert_eq!(outcome.routing_trace[0].strategy, Strategy::HybridParallel);
    assert_eq!(outcome.error_log[0].kind, ErrorKind::ClassificationAmbiguous);
    assert_eq!(outcome.answer_context.ids(), vec!["v-1", "g-1"]);
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let vector = MockVectorSearch::new()
        .with_hits("What is an SLA?", vec![hit("doc-sla", "SLA")])
        .with_hits("Explain churn", vec![hit("doc-churn", "churn")]);
    let model = accepting_model();
    let ctl = setup_controller(
        &vector,
        &MockGraphSearch::new(),
        &MockEntityExtractor::new(),
        &model,
        OrchestratorConfig::default().with_retrieval(RetrievalConfig::default().with_top_k(3)),
    );

    let (a, b) = tokio::join!(
        ctl.orchestrate(ctl.query("What is an SLA?")),
        ctl.orchestrate(ctl.query("Explain churn")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.answer_context.ids(), vec!["doc-sla"]);
    assert_eq!(b.answer_context.ids(), vec!["doc-churn"]);
}
