//! Agents, core memory, sessions, and full CRUD round-trips.

use hexmem_core::ingest::create_project;
use hexmem_core::{
    DecisionPatch, EventPatch, FactPatch, NewDecision, NewEvent, NewFact, NewMessage, NewProject,
    NewTask, NodeKind, ProjectPatch, Role, StoreError, TaskPatch, TaskStatus,
};
use hexmem_e2e_tests::harness::TestContext;
use serde_json::json;

#[test]
fn agent_resolves_by_slug_and_uuid() {
    let ctx = TestContext::new("agents-resolve");
    let by_slug = ctx.storage.get_agent("agents-resolve").unwrap();
    let by_uuid = ctx.storage.get_agent(&ctx.agent.id).unwrap();
    assert_eq!(by_slug.id, by_uuid.id);
}

#[test]
fn slug_validation_boundaries() {
    let ctx = TestContext::new("agents-slugs");
    // `a-b_c` accepted
    assert!(ctx
        .storage
        .create_agent(hexmem_core::NewAgent {
            slug: "a-b_c".to_string(),
            display_name: "ok".to_string(),
            description: None,
            core_memory: None,
            config: None,
        })
        .is_ok());
    // `abc!` rejected
    let err = ctx
        .storage
        .create_agent(hexmem_core::NewAgent {
            slug: "abc!".to_string(),
            display_name: "bad".to_string(),
            description: None,
            core_memory: None,
            config: None,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn core_memory_merge_patch_deletes_on_null() {
    let ctx = TestContext::new("agents-core-memory");

    ctx.storage
        .patch_core_memory(&ctx.agent.id, &json!({"persona": "dry", "stack": {"db": "sqlite"}}))
        .unwrap();
    let agent = ctx
        .storage
        .patch_core_memory(&ctx.agent.id, &json!({"persona": null, "stack": {"cache": "lru"}}))
        .unwrap();

    // Nulled key removed, unrelated keys persist, nested merge applies
    assert_eq!(
        agent.core_memory,
        json!({"stack": {"db": "sqlite", "cache": "lru"}})
    );
}

#[test]
fn session_end_summarizes_and_rejects_reend() {
    let ctx = TestContext::new("sessions-end");
    let session = ctx.start_session();

    for content in ["How do we persist embeddings?", "As float32 blobs on each row."] {
        ctx.pipeline
            .add_message(
                &session.id,
                NewMessage {
                    role: if content.starts_with("How") {
                        Role::User
                    } else {
                        Role::Assistant
                    },
                    content: content.to_string(),
                    metadata: None,
                },
            )
            .unwrap();
    }

    assert_eq!(ctx.storage.session_message_count(&session.id).unwrap(), 2);

    let ended = ctx.pipeline.end_session(&session.id).unwrap();
    assert!(ended.is_ended());
    assert!(ended.summary.is_some());

    let err = ctx.pipeline.end_session(&session.id).unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn fact_crud_roundtrip() {
    let ctx = TestContext::new("roundtrip-fact");
    let created = ctx
        .storage
        .insert_fact(
            &ctx.agent.id,
            &NewFact {
                content: "round trips exercise every verb".to_string(),
                subject: None,
                confidence: 0.8,
                source: None,
                tags: vec![],
                valid_from: None,
                valid_until: None,
            },
        )
        .unwrap();

    assert_eq!(ctx.storage.get_fact(&created.id).unwrap().id, created.id);

    let updated = ctx
        .storage
        .update_fact(
            &created.id,
            FactPatch {
                content: Some("round trips exercise every HTTP verb".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_ne!(updated.content, created.content);
    assert!(updated.updated_at >= created.updated_at);

    assert!(ctx.storage.delete_node(NodeKind::Fact, &created.id).unwrap());
    assert!(matches!(
        ctx.storage.get_fact(&created.id).unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[test]
fn decision_crud_roundtrip() {
    let ctx = TestContext::new("roundtrip-decision");
    let created = ctx
        .storage
        .insert_decision(
            &ctx.agent.id,
            &NewDecision {
                title: "adopt round trips".to_string(),
                decision: "every memory type gets the four verbs".to_string(),
                rationale: Some("uniform surface".to_string()),
                alternatives: vec!["bespoke endpoints".to_string()],
                context: None,
                session_id: None,
                tags: vec![],
            },
        )
        .unwrap();

    let updated = ctx
        .storage
        .update_decision(
            &created.id,
            DecisionPatch {
                context: Some("applies to the API surface".to_string()),
                tags: Some(vec!["api".to_string()]),
            },
        )
        .unwrap();
    // Body is append-only
    assert_eq!(updated.decision, created.decision);
    assert_eq!(updated.context.as_deref(), Some("applies to the API surface"));

    assert!(ctx.storage.delete_node(NodeKind::Decision, &created.id).unwrap());
    assert!(ctx.storage.get_decision(&created.id).is_err());
}

#[test]
fn task_crud_roundtrip() {
    let ctx = TestContext::new("roundtrip-task");
    let created = ctx
        .storage
        .insert_task(
            &ctx.agent.id,
            &NewTask {
                title: "round trip the task".to_string(),
                description: None,
                project_id: None,
                status: TaskStatus::NotStarted,
                priority: 40,
                assignee: None,
                due_date: None,
                blocked_by: None,
                tags: vec![],
            },
        )
        .unwrap();

    let updated = ctx
        .storage
        .update_task(
            &created.id,
            TaskPatch {
                status: Some(TaskStatus::Complete),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Complete);

    assert!(ctx.storage.delete_node(NodeKind::Task, &created.id).unwrap());
    assert!(ctx.storage.get_task(&created.id).is_err());
}

#[test]
fn event_crud_roundtrip() {
    let ctx = TestContext::new("roundtrip-event");
    let created = ctx
        .storage
        .insert_event(
            &ctx.agent.id,
            &NewEvent {
                title: "ingestion outage".to_string(),
                event_type: "incident".to_string(),
                description: None,
                outcome: None,
                project_id: None,
                caused_by: None,
                severity: hexmem_core::EventSeverity::Critical,
                occurred_at: None,
                resolved_at: None,
                tags: vec![],
            },
        )
        .unwrap();

    let updated = ctx
        .storage
        .update_event(
            &created.id,
            EventPatch {
                outcome: Some("rolled back the migration".to_string()),
                resolved_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(updated.resolved_at.is_some());

    assert!(ctx.storage.delete_node(NodeKind::Event, &created.id).unwrap());
    assert!(ctx.storage.get_event(&created.id).is_err());
}

#[test]
fn project_crud_roundtrip_with_derived_slug() {
    let ctx = TestContext::new("roundtrip-project");
    let created = create_project(
        &ctx.storage,
        &ctx.agent.id,
        NewProject {
            name: "Recall Planner (Q3)".to_string(),
            description: None,
            status: Default::default(),
            tags: vec![],
            metadata: None,
        },
    )
    .unwrap();
    assert_eq!(created.slug, "recall-planner-q3");

    let updated = ctx
        .storage
        .update_project(
            &created.id,
            ProjectPatch {
                status: Some(hexmem_core::ProjectStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.status, hexmem_core::ProjectStatus::Completed);
    // Slug never changes
    assert_eq!(updated.slug, created.slug);

    assert!(ctx.storage.delete_node(NodeKind::Project, &created.id).unwrap());
    assert!(ctx.storage.get_project(&created.id).is_err());

    // Same name is available again after deletion
    assert!(create_project(
        &ctx.storage,
        &ctx.agent.id,
        NewProject {
            name: "Recall Planner Q3".to_string(),
            description: None,
            status: Default::default(),
            tags: vec![],
            metadata: None,
        },
    )
    .is_ok());
}

#[test]
fn agent_counts_track_items() {
    let ctx = TestContext::new("agents-counts");
    let session = ctx.start_session();
    ctx.pipeline
        .add_message(
            &session.id,
            NewMessage {
                role: Role::User,
                content: "We decided to count everything carefully.".to_string(),
                metadata: None,
            },
        )
        .unwrap();

    let counts = ctx.storage.agent_counts(&ctx.agent.id).unwrap();
    assert_eq!(counts.sessions, 1);
    assert_eq!(counts.session_messages, 1);
    assert_eq!(counts.decisions, 1);
}
