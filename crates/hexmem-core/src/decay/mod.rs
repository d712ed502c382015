//! Decay Engine
//!
//! Two-phase lifecycle per sweep: stale actives cool, aged cooling rows
//! archive. Policies resolve most-specific-wins per `(agent, memory_type)`;
//! a NULL ttl exempts the type entirely. Active rows at or above the
//! policy's `min_accesses` are immune to cooling.
//!
//! Sweeps are triggered manually or by the hourly background ticker, and are
//! cancellable between tables, not within one.

use chrono::{Duration, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::memory::{DecayPolicy, MemoryKind};
use crate::storage::{Result, Storage};

/// Days a cooling row waits before archiving.
pub const COOLING_WINDOW_DAYS: i64 = 30;

/// Counters returned by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub transitioned_to_cooling: u64,
    pub transitioned_to_archived: u64,
    pub immune_items: u64,
}

/// Per-table lifecycle counts for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TableDecayCounts {
    pub memory_type: MemoryKind,
    pub active: i64,
    pub cooling: i64,
    pub archived: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecayStatusReport {
    pub tables: Vec<TableDecayCounts>,
    pub policies: Vec<DecayPolicy>,
}

/// Run one sweep, optionally scoped to a single agent.
pub fn sweep(storage: &Storage, agent: Option<&str>) -> Result<SweepStats> {
    let agent_ids: Vec<String> = match agent {
        Some(a) => vec![storage.resolve_agent_id(a)?],
        None => storage
            .list_agents()?
            .into_iter()
            .map(|agent| agent.id)
            .collect(),
    };

    let mut stats = SweepStats::default();
    let now = Utc::now();
    let archive_cutoff = (now - Duration::days(COOLING_WINDOW_DAYS)).to_rfc3339();

    for agent_id in &agent_ids {
        for kind in MemoryKind::ALL {
            let policy = storage.resolve_policy(agent_id, kind)?;

            if let Some(ttl_days) = policy.ttl_days {
                let cutoff = (now - Duration::days(ttl_days)).to_rfc3339();

                let cooled = {
                    let sql = format!(
                        "UPDATE {table} SET decay_status = 'cooling', updated_at = ?1
                         WHERE agent_id = ?2 AND decay_status = 'active'
                           AND access_count < ?3
                           AND ((last_accessed_at IS NULL AND {time_col} < ?4)
                                OR (last_accessed_at IS NOT NULL AND last_accessed_at < ?4))",
                        table = kind.table(),
                        time_col = kind.time_column(),
                    );
                    let writer = storage.lock_writer()?;
                    writer.execute(
                        &sql,
                        params![now.to_rfc3339(), agent_id, policy.min_accesses, cutoff],
                    )?
                };
                stats.transitioned_to_cooling += cooled as u64;

                let immune: i64 = {
                    let sql = format!(
                        "SELECT COUNT(*) FROM {table}
                         WHERE agent_id = ?1 AND decay_status = 'active' AND access_count >= ?2",
                        table = kind.table(),
                    );
                    let reader = storage.lock_reader()?;
                    reader.query_row(&sql, params![agent_id, policy.min_accesses], |row| {
                        row.get(0)
                    })?
                };
                stats.immune_items += immune as u64;
            }

            // Cooling rows age out regardless of the current ttl so a policy
            // change cannot strand them.
            let archived = {
                let sql = format!(
                    "UPDATE {table} SET decay_status = 'archived', updated_at = ?1
                     WHERE agent_id = ?2 AND decay_status = 'cooling' AND updated_at < ?3",
                    table = kind.table(),
                );
                let writer = storage.lock_writer()?;
                writer.execute(&sql, params![now.to_rfc3339(), agent_id, archive_cutoff])?
            };
            stats.transitioned_to_archived += archived as u64;
        }
    }

    tracing::info!(
        cooled = stats.transitioned_to_cooling,
        archived = stats.transitioned_to_archived,
        immune = stats.immune_items,
        agents = agent_ids.len(),
        "decay sweep complete"
    );

    Ok(stats)
}

/// Per-table lifecycle counts plus the applicable policies.
pub fn status(storage: &Storage, agent: Option<&str>) -> Result<DecayStatusReport> {
    let agent_id = match agent {
        Some(a) => Some(storage.resolve_agent_id(a)?),
        None => None,
    };

    let mut tables = Vec::with_capacity(MemoryKind::ALL.len());
    for kind in MemoryKind::ALL {
        let mut counts = TableDecayCounts {
            memory_type: kind,
            active: 0,
            cooling: 0,
            archived: 0,
        };

        let reader = storage.lock_reader()?;
        let mut tally = |status: &str, count: i64| match status {
            "active" => counts.active = count,
            "cooling" => counts.cooling = count,
            "archived" => counts.archived = count,
            _ => {}
        };

        match &agent_id {
            Some(agent_id) => {
                let sql = format!(
                    "SELECT decay_status, COUNT(*) FROM {} WHERE agent_id = ?1 GROUP BY decay_status",
                    kind.table()
                );
                let mut stmt = reader.prepare(&sql)?;
                let rows = stmt.query_map(params![agent_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (status, count) = row?;
                    tally(&status, count);
                }
            }
            None => {
                let sql = format!(
                    "SELECT decay_status, COUNT(*) FROM {} GROUP BY decay_status",
                    kind.table()
                );
                let mut stmt = reader.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (status, count) = row?;
                    tally(&status, count);
                }
            }
        }
        drop(reader);

        tables.push(counts);
    }

    let policies = storage.list_policies(agent_id.as_deref())?;

    Ok(DecayStatusReport { tables, policies })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DecayStatus, NewAgent, NewFact};

    fn temp_storage() -> (tempfile::TempDir, Storage, String) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(Some(dir.path().join("test.db")), None).unwrap();
        let agent_id = storage
            .create_agent(NewAgent {
                slug: "decay-test".to_string(),
                display_name: "Decay".to_string(),
                description: None,
                core_memory: None,
                config: None,
            })
            .unwrap()
            .id;
        (dir, storage, agent_id)
    }

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

    fn backdate(storage: &Storage, id: &str, column: &str, days: i64) {
        let past = (Utc::now() - Duration::days(days)).to_rfc3339();
        let writer = storage.lock_writer().unwrap();
        writer
            .execute(
                &format!("UPDATE facts SET {} = ?1 WHERE id = ?2", column),
                params![past, id],
            )
            .unwrap();
    }

    #[test]
    fn fresh_data_does_not_transition() {
        let (_dir, storage, agent_id) = temp_storage();
        storage.insert_fact(&agent_id, &fact("fresh fact")).unwrap();

        let stats = sweep(&storage, Some(&agent_id)).unwrap();
        assert_eq!(stats.transitioned_to_cooling, 0);
        assert_eq!(stats.transitioned_to_archived, 0);
    }

    #[test]
    fn stale_never_accessed_fact_cools() {
        let (_dir, storage, agent_id) = temp_storage();
        let row = storage.insert_fact(&agent_id, &fact("stale fact")).unwrap();
        // Fact ttl defaults to 90 days
        backdate(&storage, &row.id, "created_at", 91);

        let stats = sweep(&storage, Some(&agent_id)).unwrap();
        assert_eq!(stats.transitioned_to_cooling, 1);
        assert_eq!(
            storage.get_fact(&row.id).unwrap().decay_status,
            DecayStatus::Cooling
        );
    }

    #[test]
    fn accessed_items_are_immune() {
        let (_dir, storage, agent_id) = temp_storage();
        let row = storage.insert_fact(&agent_id, &fact("hot fact")).unwrap();
        backdate(&storage, &row.id, "created_at", 91);
        {
            let writer = storage.lock_writer().unwrap();
            writer
                .execute(
                    "UPDATE facts SET access_count = 5, last_accessed_at = ?1 WHERE id = ?2",
                    params![Utc::now().to_rfc3339(), row.id],
                )
                .unwrap();
        }

        let stats = sweep(&storage, Some(&agent_id)).unwrap();
        assert_eq!(stats.transitioned_to_cooling, 0);
        assert!(stats.immune_items >= 1);
        assert_eq!(
            storage.get_fact(&row.id).unwrap().decay_status,
            DecayStatus::Active
        );
    }

    #[test]
    fn recently_accessed_stale_item_stays_active() {
        let (_dir, storage, agent_id) = temp_storage();
        let row = storage.insert_fact(&agent_id, &fact("old but touched")).unwrap();
        backdate(&storage, &row.id, "created_at", 120);
        {
            // Below min_accesses but touched within the ttl window
            let writer = storage.lock_writer().unwrap();
            writer
                .execute(
                    "UPDATE facts SET access_count = 1, last_accessed_at = ?1 WHERE id = ?2",
                    params![Utc::now().to_rfc3339(), row.id],
                )
                .unwrap();
        }

        let stats = sweep(&storage, Some(&agent_id)).unwrap();
        assert_eq!(stats.transitioned_to_cooling, 0);
    }

    #[test]
    fn aged_cooling_rows_archive() {
        let (_dir, storage, agent_id) = temp_storage();
        let row = storage.insert_fact(&agent_id, &fact("long cooling")).unwrap();
        {
            let writer = storage.lock_writer().unwrap();
            writer
                .execute(
                    "UPDATE facts SET decay_status = 'cooling' WHERE id = ?1",
                    params![row.id],
                )
                .unwrap();
        }
        backdate(&storage, &row.id, "updated_at", COOLING_WINDOW_DAYS + 1);

        let stats = sweep(&storage, Some(&agent_id)).unwrap();
        assert_eq!(stats.transitioned_to_archived, 1);
        assert_eq!(
            storage.get_fact(&row.id).unwrap().decay_status,
            DecayStatus::Archived
        );
    }

    #[test]
    fn decisions_do_not_auto_decay() {
        let (_dir, storage, agent_id) = temp_storage();
        let decision = storage
            .insert_decision(
                &agent_id,
                &crate::memory::NewDecision {
                    title: "keep decisions".to_string(),
                    decision: "decisions are exempt by default".to_string(),
                    rationale: None,
                    alternatives: vec![],
                    context: None,
                    session_id: None,
                    tags: vec![],
                },
            )
            .unwrap();
        {
            let writer = storage.lock_writer().unwrap();
            writer
                .execute(
                    "UPDATE decisions SET created_at = ?1 WHERE id = ?2",
                    params![(Utc::now() - Duration::days(400)).to_rfc3339(), decision.id],
                )
                .unwrap();
        }

        let stats = sweep(&storage, Some(&agent_id)).unwrap();
        assert_eq!(stats.transitioned_to_cooling, 0);
        assert_eq!(
            storage.get_decision(&decision.id).unwrap().decay_status,
            DecayStatus::Active
        );
    }

    #[test]
    fn revival_restores_active_and_bumps_access() {
        let (_dir, storage, agent_id) = temp_storage();
        let row = storage.insert_fact(&agent_id, &fact("revive me")).unwrap();
        {
            let writer = storage.lock_writer().unwrap();
            writer
                .execute(
                    "UPDATE facts SET decay_status = 'archived' WHERE id = ?1",
                    params![row.id],
                )
                .unwrap();
        }

        assert!(storage.revive(MemoryKind::Fact, &row.id).unwrap());
        let revived = storage.get_fact(&row.id).unwrap();
        assert_eq!(revived.decay_status, DecayStatus::Active);
        assert_eq!(revived.access_count, 1);
        assert!(revived.last_accessed_at.is_some());

        // Reviving an active row is a no-op
        assert!(!storage.revive(MemoryKind::Fact, &row.id).unwrap());
    }

    #[test]
    fn status_reports_counts_and_policies() {
        let (_dir, storage, agent_id) = temp_storage();
        storage.insert_fact(&agent_id, &fact("counted fact")).unwrap();

        let report = status(&storage, Some(&agent_id)).unwrap();
        let facts = report
            .tables
            .iter()
            .find(|t| t.memory_type == MemoryKind::Fact)
            .unwrap();
        assert_eq!(facts.active, 1);
        assert_eq!(facts.cooling + facts.archived, 0);
        assert!(report.policies.len() >= MemoryKind::ALL.len());
    }
}
