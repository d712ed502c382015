//! Near-duplicate detection on the direct write path.

use std::sync::Arc;

use hexmem_core::ingest::{create_fact_checked, create_task_checked};
use hexmem_core::{ListFilter, NewFact, NewMessage, NewTask, Role, StoreError, TaskStatus};
use hexmem_e2e_tests::harness::TestContext;
use hexmem_e2e_tests::mocks::ConstEmbedder;

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

#[test]
fn duplicate_fact_post_conflicts_with_existing_id() {
    let ctx = TestContext::new("dedup-journey");
    let content = "TypeScript is the primary language used in this project";

    let first = create_fact_checked(&ctx.storage, &ctx.agent.id, fact(content)).unwrap();
    let err = create_fact_checked(&ctx.storage, &ctx.agent.id, fact(content)).unwrap_err();

    match err {
        StoreError::Conflict {
            existing_id,
            similarity,
            ..
        } => {
            assert_eq!(existing_id.as_deref(), Some(first.id.as_str()));
            assert!(similarity.unwrap() >= 0.6);
        }
        other => panic!("expected 409-style conflict, got {:?}", other),
    }
}

#[test]
fn semantic_stage_conflicts_at_high_cosine() {
    let ctx = TestContext::with_embedder("dedup-semantic", Some(Arc::new(ConstEmbedder::default())));

    create_fact_checked(
        &ctx.storage,
        &ctx.agent.id,
        fact("the deploy pipeline uses blue green rollouts"),
    )
    .unwrap();

    // Lexically disjoint, semantically identical under the scripted embedder
    let err = create_fact_checked(
        &ctx.storage,
        &ctx.agent.id,
        fact("quarterly numbers were strong"),
    )
    .unwrap_err();

    match err {
        StoreError::Conflict { similarity, .. } => assert!(similarity.unwrap() >= 0.92),
        other => panic!("expected semantic conflict, got {:?}", other),
    }
}

#[test]
fn tasks_dedup_on_title() {
    let ctx = TestContext::new("dedup-tasks");
    let input = || NewTask {
        title: "implement the hybrid recall planner".to_string(),
        description: None,
        project_id: None,
        status: TaskStatus::NotStarted,
        priority: 50,
        assignee: None,
        due_date: None,
        blocked_by: None,
        tags: vec![],
    };

    create_task_checked(&ctx.storage, &ctx.agent.id, input()).unwrap();
    let err = create_task_checked(&ctx.storage, &ctx.agent.id, input()).unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[test]
fn pipeline_ingestion_never_rejects_duplicates() {
    let ctx = TestContext::new("dedup-pipeline");
    let session = ctx.start_session();
    let message = NewMessage {
        role: Role::User,
        content: "We decided to standardize on tokio for async runtimes.".to_string(),
        metadata: None,
    };

    ctx.pipeline.add_message(&session.id, message.clone()).unwrap();
    ctx.pipeline.add_message(&session.id, message).unwrap();

    // Both extractions inserted; extraction is authoritative
    let decisions = ctx.storage.list_decisions(&ListFilter::default()).unwrap();
    assert_eq!(decisions.len(), 2);
}
