//! Analytics Query Log
//!
//! Append-only, best-effort: a failed write never affects the request that
//! produced it. A background task prunes rows older than the retention
//! window.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::storage::{Result, Storage};

/// Rows older than this are pruned.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    pub latency_ms: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuerySummary {
    pub total_queries: i64,
    pub avg_latency_ms: f64,
    pub endpoints: BTreeMap<String, i64>,
    pub recent: Vec<QueryLogEntry>,
}

impl Storage {
    /// Append a query-log row. Best-effort by contract: failures log at
    /// debug and vanish.
    pub fn log_query(
        &self,
        agent_id: Option<&str>,
        endpoint: &str,
        query_text: Option<&str>,
        latency_ms: i64,
        metadata: Value,
    ) {
        let result: Result<()> = (|| {
            let writer = self.lock_writer()?;
            writer.execute(
                "INSERT INTO query_log (agent_id, endpoint, query_text, latency_ms, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    agent_id,
                    endpoint,
                    query_text,
                    latency_ms,
                    serde_json::to_string(&metadata)?,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::debug!("query log append failed: {}", e);
        }
    }

    /// Delete rows older than the retention window. Returns how many went.
    pub fn prune_query_log(&self, older_than_days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(older_than_days)).to_rfc3339();
        let writer = self.lock_writer()?;
        let pruned = writer.execute("DELETE FROM query_log WHERE created_at < ?1", params![cutoff])?;
        Ok(pruned)
    }

    /// Aggregate view for the analytics endpoint.
    pub fn query_summary(&self, recent_limit: i64) -> Result<QuerySummary> {
        let reader = self.lock_reader()?;

        let (total_queries, avg_latency_ms): (i64, f64) = reader.query_row(
            "SELECT COUNT(*), COALESCE(AVG(latency_ms), 0.0) FROM query_log",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut endpoints = BTreeMap::new();
        let mut stmt =
            reader.prepare("SELECT endpoint, COUNT(*) FROM query_log GROUP BY endpoint")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (endpoint, count) = row?;
            endpoints.insert(endpoint, count);
        }

        let mut stmt = reader.prepare(
            "SELECT id, agent_id, endpoint, query_text, latency_ms, metadata, created_at
             FROM query_log ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![recent_limit.clamp(1, 200)], |row| {
            let metadata: String = row.get(5)?;
            let created_at: String = row.get(6)?;
            Ok(QueryLogEntry {
                id: row.get(0)?,
                agent_id: row.get(1)?,
                endpoint: row.get(2)?,
                query_text: row.get(3)?,
                latency_ms: row.get(4)?,
                metadata: Self::json_or_default(metadata),
                created_at: Self::parse_timestamp(&created_at, "created_at")?,
            })
        })?;
        let recent = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(QuerySummary {
            total_queries,
            avg_latency_ms,
            endpoints,
            recent,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
