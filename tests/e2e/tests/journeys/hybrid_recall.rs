//! Hybrid recall: fusion math, filters, limits, expansion, fallbacks.

use hexmem_core::recall::{recall, search, RecallRequest, SearchRequest};
use hexmem_core::{NewEdge, NewFact, NodeKind, Relation, StoreError};
use hexmem_e2e_tests::harness::TestContext;

fn fact(content: &str) -> NewFact {
    NewFact {
        content: content.to_string(),
        subject: None,
        confidence: 1.0,
        source: None,
        tags: vec![],
        valid_from: None,
        valid_until: None,
    }
}

fn request(agent_id: &str, query: &str) -> RecallRequest {
    RecallRequest {
        query: Some(query.to_string()),
        agent_id: Some(agent_id.to_string()),
        types: None,
        limit: None,
        semantic_weight: None,
        keyword_weight: None,
        recency_weight: None,
        include_related: None,
    }
}

#[test]
fn weights_echo_in_response() {
    let ctx = TestContext::new("recall-weights");
    ctx.storage
        .insert_fact(&ctx.agent.id, &fact("Fastify terminates the HTTP layer"))
        .unwrap();

    let mut req = request(&ctx.agent.id, "Fastify");
    req.semantic_weight = Some(0.3);
    req.keyword_weight = Some(0.6);
    req.recency_weight = Some(0.1);

    let response = recall(&ctx.storage, req).unwrap();
    assert_eq!(response.weights.semantic, 0.3);
    assert_eq!(response.weights.keyword, 0.6);
    assert_eq!(response.weights.recency, 0.1);
    assert_eq!(response.total, response.results.len());
}

#[test]
fn score_is_weighted_sum_of_signals() {
    let ctx = TestContext::new("recall-formula");
    for content in [
        "the planner fuses semantic and keyword arms",
        "keyword matching uses trigram similarity",
        "recency decays linearly over ninety days",
    ] {
        ctx.storage.insert_fact(&ctx.agent.id, &fact(content)).unwrap();
    }

    let response = recall(&ctx.storage, request(&ctx.agent.id, "trigram keyword planner")).unwrap();
    assert!(!response.results.is_empty());

    for result in &response.results {
        let expected = response.weights.semantic * result.signals.semantic.unwrap_or(0.0)
            + response.weights.keyword * result.signals.keyword.unwrap_or(0.0)
            + response.weights.recency * result.signals.recency.unwrap_or(0.0)
            + 0.1 * result.signals.graph_boost.unwrap_or(0.0);
        assert!((result.score - expected).abs() < 1e-9);
    }

    // Sorted descending
    for pair in response.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn type_filter_returns_only_that_type() {
    let ctx = TestContext::new("recall-filter");
    ctx.storage
        .insert_fact(&ctx.agent.id, &fact("filters restrict candidate tables"))
        .unwrap();

    let mut req = request(&ctx.agent.id, "filters restrict candidate tables");
    req.types = Some(vec!["fact".to_string()]);
    let response = recall(&ctx.storage, req).unwrap();

    assert!(!response.results.is_empty());
    assert!(response.results.iter().all(|r| r.kind == NodeKind::Fact));
}

#[test]
fn missing_agent_id_is_invalid_argument() {
    let ctx = TestContext::new("recall-no-agent");
    let mut req = request(&ctx.agent.id, "whatever");
    req.agent_id = None;
    assert!(matches!(
        recall(&ctx.storage, req).unwrap_err(),
        StoreError::InvalidArgument(_)
    ));
}

#[test]
fn limit_is_honored_and_expansion_stops_at_five() {
    let ctx = TestContext::new("recall-limits");

    // Eight matching facts, each with one outgoing edge to a real neighbor
    let neighbor = ctx
        .storage
        .insert_fact(&ctx.agent.id, &fact("shared neighbor node"))
        .unwrap();
    for i in 0..8 {
        let parent = ctx
            .storage
            .insert_fact(
                &ctx.agent.id,
                &fact(&format!("expansion probe number {} about limits", i)),
            )
            .unwrap();
        ctx.storage
            .upsert_edge(&NewEdge {
                agent_id: ctx.agent.id.clone(),
                source_type: NodeKind::Fact,
                source_id: parent.id,
                target_type: NodeKind::Fact,
                target_id: neighbor.id.clone(),
                relation: Relation::RelatesTo,
                weight: 0.8,
                metadata: None,
            })
            .unwrap();
    }

    let mut req = request(&ctx.agent.id, "expansion probe about limits");
    req.limit = Some(8);
    let response = recall(&ctx.storage, req).unwrap();
    assert!(response.results.len() <= 8);

    let with_related = response
        .results
        .iter()
        .filter(|r| r.related.is_some())
        .count();
    assert!(with_related <= 5, "expansion must stop at the first five");

    // Small limit is honored exactly
    let mut req = request(&ctx.agent.id, "expansion probe about limits");
    req.limit = Some(3);
    let response = recall(&ctx.storage, req).unwrap();
    assert_eq!(response.results.len(), 3);
}

#[test]
fn embedderless_recall_is_well_formed_lexical_fallback() {
    let ctx = TestContext::without_embedder("recall-fallback");
    ctx.storage
        .insert_fact(&ctx.agent.id, &fact("lexical fallback still answers"))
        .unwrap();

    let response = recall(&ctx.storage, request(&ctx.agent.id, "lexical fallback")).unwrap();
    assert!(!response.results.is_empty());
    for result in &response.results {
        assert!(result.signals.semantic.is_none());
    }
}

#[test]
fn direct_search_without_embedder_is_unavailable() {
    let ctx = TestContext::without_embedder("search-503");
    let err = search(
        &ctx.storage,
        SearchRequest {
            query: Some("anything".to_string()),
            agent_id: Some(ctx.agent.id.clone()),
            types: None,
            limit: None,
            threshold: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::CapabilityUnavailable(_)));
}

#[test]
fn recall_is_scoped_to_the_agent() {
    let ctx = TestContext::new("recall-tenant-a");
    let other = ctx.create_agent("recall-tenant-b");

    ctx.storage
        .insert_fact(&ctx.agent.id, &fact("tenant a private memory"))
        .unwrap();

    let response = recall(&ctx.storage, request(&other.id, "tenant a private memory")).unwrap();
    assert!(response.results.is_empty());
}
