//! Decay lifecycle: sweep phases, immunity, exclusion from recall, revival.

use chrono::{Duration, Utc};
use hexmem_core::decay::{status, sweep, COOLING_WINDOW_DAYS};
use hexmem_core::recall::{recall, RecallRequest};
use hexmem_core::rusqlite::params;
use hexmem_core::{DecayStatus, MemoryKind, NewFact};
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

fn set_fact_column(ctx: &TestContext, id: &str, column: &str, value: &str) {
    let writer = ctx.storage.lock_writer().unwrap();
    writer
        .execute(
            &format!("UPDATE facts SET {} = ?1 WHERE id = ?2", column),
            params![value, id],
        )
        .unwrap();
}

#[test]
fn fresh_data_sweep_is_a_noop() {
    let ctx = TestContext::new("decay-fresh");
    ctx.storage.insert_fact(&ctx.agent.id, &fact("brand new fact")).unwrap();

    let stats = sweep(&ctx.storage, Some(&ctx.agent.id)).unwrap();
    assert_eq!(stats.transitioned_to_cooling, 0);
    assert_eq!(stats.transitioned_to_archived, 0);
}

#[test]
fn two_phase_lifecycle_cools_then_archives() {
    let ctx = TestContext::new("decay-phases");
    let row = ctx.storage.insert_fact(&ctx.agent.id, &fact("ephemeral fact")).unwrap();

    // Past the fact ttl (90 days), never accessed
    let stale = (Utc::now() - Duration::days(91)).to_rfc3339();
    set_fact_column(&ctx, &row.id, "created_at", &stale);

    let stats = sweep(&ctx.storage, Some(&ctx.agent.id)).unwrap();
    assert_eq!(stats.transitioned_to_cooling, 1);
    assert_eq!(
        ctx.storage.get_fact(&row.id).unwrap().decay_status,
        DecayStatus::Cooling
    );

    // Cooling for longer than the 30-day window
    let old = (Utc::now() - Duration::days(COOLING_WINDOW_DAYS + 1)).to_rfc3339();
    set_fact_column(&ctx, &row.id, "updated_at", &old);

    let stats = sweep(&ctx.storage, Some(&ctx.agent.id)).unwrap();
    assert_eq!(stats.transitioned_to_archived, 1);
    assert_eq!(
        ctx.storage.get_fact(&row.id).unwrap().decay_status,
        DecayStatus::Archived
    );
}

#[test]
fn access_immunity_blocks_cooling() {
    let ctx = TestContext::new("decay-immunity");
    let row = ctx.storage.insert_fact(&ctx.agent.id, &fact("well loved fact")).unwrap();

    let stale = (Utc::now() - Duration::days(365)).to_rfc3339();
    set_fact_column(&ctx, &row.id, "created_at", &stale);
    set_fact_column(&ctx, &row.id, "last_accessed_at", &stale);
    {
        let writer = ctx.storage.lock_writer().unwrap();
        writer
            .execute(
                "UPDATE facts SET access_count = 10 WHERE id = ?1",
                params![row.id],
            )
            .unwrap();
    }

    let stats = sweep(&ctx.storage, Some(&ctx.agent.id)).unwrap();
    assert_eq!(stats.transitioned_to_cooling, 0);
    assert!(stats.immune_items >= 1);
}

#[test]
fn archived_items_leave_recall_but_stay_addressable() {
    let ctx = TestContext::new("decay-archived");
    let row = ctx
        .storage
        .insert_fact(&ctx.agent.id, &fact("archived but addressable"))
        .unwrap();
    set_fact_column(&ctx, &row.id, "decay_status", "archived");

    let response = recall(
        &ctx.storage,
        RecallRequest {
            query: Some("archived but addressable".to_string()),
            agent_id: Some(ctx.agent.id.clone()),
            types: None,
            limit: None,
            semantic_weight: None,
            keyword_weight: None,
            recency_weight: None,
            include_related: None,
        },
    )
    .unwrap();
    assert!(response.results.iter().all(|r| r.id != row.id));

    // Direct id access still works
    assert_eq!(ctx.storage.get_fact(&row.id).unwrap().id, row.id);
}

#[test]
fn revival_returns_to_active() {
    let ctx = TestContext::new("decay-revival");
    let row = ctx.storage.insert_fact(&ctx.agent.id, &fact("revivable fact")).unwrap();
    set_fact_column(&ctx, &row.id, "decay_status", "cooling");

    assert!(ctx.storage.revive(MemoryKind::Fact, &row.id).unwrap());
    let revived = ctx.storage.get_fact(&row.id).unwrap();
    assert_eq!(revived.decay_status, DecayStatus::Active);
    assert_eq!(revived.access_count, 1);
}

#[test]
fn status_reports_per_table_counts_and_policies() {
    let ctx = TestContext::new("decay-status");
    ctx.storage.insert_fact(&ctx.agent.id, &fact("counted")).unwrap();

    let report = status(&ctx.storage, Some(&ctx.agent.id)).unwrap();
    assert_eq!(report.tables.len(), MemoryKind::ALL.len());

    let facts = report
        .tables
        .iter()
        .find(|t| t.memory_type == MemoryKind::Fact)
        .unwrap();
    assert_eq!(facts.active, 1);

    // Global defaults cover every type; decisions and tasks carry no ttl
    let decision_policy = report
        .policies
        .iter()
        .find(|p| p.memory_type == MemoryKind::Decision)
        .unwrap();
    assert!(decision_policy.ttl_days.is_none());
}
