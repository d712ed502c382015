//! Edge graph: idempotent upsert, node views, dangling tolerance.

use hexmem_core::ingest::{create_decision_checked, create_fact_checked};
use hexmem_core::{EdgeFilter, NewDecision, NewEdge, NewFact, NodeKind, Relation};
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

fn edge(
    ctx: &TestContext,
    source: (NodeKind, &str),
    target: (NodeKind, &str),
    relation: Relation,
    weight: f64,
) -> NewEdge {
    NewEdge {
        agent_id: ctx.agent.id.clone(),
        source_type: source.0,
        source_id: source.1.to_string(),
        target_type: target.0,
        target_id: target.1.to_string(),
        relation,
        weight,
        metadata: None,
    }
}

#[test]
fn upsert_on_five_tuple_keeps_id_and_updates_weight() {
    let ctx = TestContext::new("edges-upsert");
    let f = create_fact_checked(&ctx.storage, &ctx.agent.id, fact("edge source fact")).unwrap();
    let d = create_decision_checked(
        &ctx.storage,
        &ctx.agent.id,
        NewDecision {
            title: "edge target".to_string(),
            decision: "decisions can be edge targets".to_string(),
            rationale: None,
            alternatives: vec![],
            context: None,
            session_id: None,
            tags: vec![],
        },
    )
    .unwrap();

    let first = ctx
        .storage
        .upsert_edge(&edge(
            &ctx,
            (NodeKind::Fact, &f.id),
            (NodeKind::Decision, &d.id),
            Relation::RelatesTo,
            0.9,
        ))
        .unwrap();
    let second = ctx
        .storage
        .upsert_edge(&edge(
            &ctx,
            (NodeKind::Fact, &f.id),
            (NodeKind::Decision, &d.id),
            Relation::RelatesTo,
            1.0,
        ))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.weight, 1.0);

    let all = ctx
        .storage
        .list_edges(&EdgeFilter {
            source_id: Some(f.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn node_view_counts_both_directions() {
    let ctx = TestContext::new("edges-view");
    let f = create_fact_checked(&ctx.storage, &ctx.agent.id, fact("central node")).unwrap();

    // Two outgoing edges from the fact
    ctx.storage
        .upsert_edge(&edge(
            &ctx,
            (NodeKind::Fact, &f.id),
            (NodeKind::Task, "task-a"),
            Relation::References,
            1.0,
        ))
        .unwrap();
    ctx.storage
        .upsert_edge(&edge(
            &ctx,
            (NodeKind::Fact, &f.id),
            (NodeKind::Task, "task-b"),
            Relation::LedTo,
            0.7,
        ))
        .unwrap();

    let (outgoing, incoming) = ctx.storage.node_graph(NodeKind::Fact, &f.id).unwrap();
    assert_eq!(outgoing.len() + incoming.len(), 2);
    assert_eq!(outgoing.len(), 2);
}

#[test]
fn self_edge_appears_in_both_directions() {
    let ctx = TestContext::new("edges-self");
    let f = create_fact_checked(&ctx.storage, &ctx.agent.id, fact("self referential")).unwrap();

    ctx.storage
        .upsert_edge(&edge(
            &ctx,
            (NodeKind::Fact, &f.id),
            (NodeKind::Fact, &f.id),
            Relation::RelatesTo,
            1.0,
        ))
        .unwrap();

    // The view intentionally does not dedup across directions
    let (outgoing, incoming) = ctx.storage.node_graph(NodeKind::Fact, &f.id).unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(incoming.len(), 1);
}

#[test]
fn edges_may_dangle() {
    let ctx = TestContext::new("edges-dangle");

    // Neither endpoint exists; the edge persists anyway
    let stored = ctx
        .storage
        .upsert_edge(&edge(
            &ctx,
            (NodeKind::Fact, "ghost-source"),
            (NodeKind::Task, "ghost-target"),
            Relation::Blocks,
            1.0,
        ))
        .unwrap();

    assert_eq!(ctx.storage.get_edge(&stored.id).unwrap().id, stored.id);
    assert!(ctx
        .storage
        .fetch_node_summary(NodeKind::Fact, "ghost-source")
        .unwrap()
        .is_none());
}

#[test]
fn delete_is_idempotent_safe() {
    let ctx = TestContext::new("edges-delete");
    let f = create_fact_checked(&ctx.storage, &ctx.agent.id, fact("deletable edges")).unwrap();
    let stored = ctx
        .storage
        .upsert_edge(&edge(
            &ctx,
            (NodeKind::Fact, &f.id),
            (NodeKind::Task, "task-x"),
            Relation::References,
            1.0,
        ))
        .unwrap();

    assert!(ctx.storage.delete_edge(&stored.id).unwrap());
    // A second delete reports "not found" rather than failing
    assert!(!ctx.storage.delete_edge(&stored.id).unwrap());
}
