//! Ingestion hot path: persist → context → extract → store → link.

use std::sync::Arc;

use hexmem_core::extract::ExtractiveSummarizer;
use hexmem_core::{
    EdgeFilter, IngestPipeline, ListFilter, NewMessage, NodeKind, Role,
};
use hexmem_e2e_tests::harness::TestContext;
use hexmem_e2e_tests::mocks::{FailingEmbedder, FailingExtractor};

fn user_message(content: &str) -> NewMessage {
    NewMessage {
        role: Role::User,
        content: content.to_string(),
        metadata: None,
    }
}

#[test]
fn ingest_with_extraction_end_to_end() {
    let ctx = TestContext::new("p2-test-1");
    let session = ctx.start_session();

    let outcome = ctx
        .pipeline
        .add_message(
            &session.id,
            user_message(
                "We decided to use PostgreSQL for the database because it supports vector \
                 extensions. The main task is to implement the search feature by next Friday.",
            ),
        )
        .unwrap();

    assert!(
        outcome.extracted.decisions + outcome.extracted.tasks + outcome.extracted.facts
            + outcome.extracted.events
            >= 1
    );
    assert_eq!(outcome.message.session_id, session.id);
    assert!(outcome.message.has_embedding);

    // The stored decision carries session_id and an edge back to the session
    let decisions = ctx.storage.list_decisions(&ListFilter::default()).unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].session_id.as_deref(), Some(session.id.as_str()));

    let edges = ctx
        .storage
        .list_edges(&EdgeFilter {
            source_type: Some(NodeKind::Decision),
            source_id: Some(decisions[0].id.clone()),
            target_type: Some(NodeKind::Session),
            target_id: Some(session.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(edges.len(), 1, "decision must link decided_in → session");

    // Every extracted item got a derivation edge (P3)
    let all_edges = ctx
        .storage
        .list_edges(&EdgeFilter {
            target_type: Some(NodeKind::Session),
            target_id: Some(session.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all_edges.len(), outcome.extracted.total());
}

#[test]
fn extractor_failure_is_swallowed() {
    let ctx = TestContext::new("extract-fail");
    let session = ctx.start_session();

    let pipeline = IngestPipeline::new(
        ctx.storage.clone(),
        Arc::new(FailingExtractor),
        Arc::new(ExtractiveSummarizer::new()),
    );

    let outcome = pipeline
        .add_message(&session.id, user_message("anything worth extracting here"))
        .unwrap();

    assert_eq!(outcome.extracted.total(), 0);
    assert_eq!(ctx.storage.list_messages(&session.id).unwrap().len(), 1);
}

#[test]
fn embedder_failure_still_persists_rows() {
    let ctx = TestContext::with_embedder("embed-fail", Some(Arc::new(FailingEmbedder)));
    let session = ctx.start_session();

    let outcome = ctx
        .pipeline
        .add_message(
            &session.id,
            user_message("We decided to keep writing rows when the embedder is down."),
        )
        .unwrap();

    // Row written, embedding column null
    assert!(!outcome.message.has_embedding);
    assert_eq!(outcome.extracted.decisions, 1);

    let decisions = ctx.storage.list_decisions(&ListFilter::default()).unwrap();
    assert!(!decisions[0].has_embedding);
}

#[test]
fn context_window_is_prior_four_messages() {
    let ctx = TestContext::new("context-window");
    let session = ctx.start_session();

    for i in 0..6 {
        ctx.pipeline
            .add_message(&session.id, user_message(&format!("context filler number {}", i)))
            .unwrap();
    }

    let tail = ctx.storage.recent_messages(&session.id, 4).unwrap();
    assert_eq!(tail.len(), 4);
    // Oldest-first ordering of the most recent four
    assert!(tail[0].content.ends_with("2"));
    assert!(tail[3].content.ends_with("5"));
}
