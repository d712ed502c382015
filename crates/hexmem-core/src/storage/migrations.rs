//! Database Migrations
//!
//! Migrations are named, applied in lexicographic order, and recorded in the
//! `_migrations` ledger. Each migration runs in its own transaction; a
//! failure rolls the transaction back and aborts startup, so a partially
//! applied set on disk is always a clean prefix of `MIGRATIONS`.

/// Migration definitions, lexicographically ordered by name.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_agents_and_sessions",
        up: MIGRATION_0001_UP,
    },
    Migration {
        name: "0002_memory_items",
        up: MIGRATION_0002_UP,
    },
    Migration {
        name: "0003_edges_and_decay",
        up: MIGRATION_0003_UP,
    },
    Migration {
        name: "0004_query_log",
        up: MIGRATION_0004_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique name recorded in the ledger
    pub name: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// 0001: Agents, API keys, sessions, and the message hot path
const MIGRATION_0001_UP: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    description TEXT,
    core_memory TEXT NOT NULL DEFAULT '{}',
    config TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    key_hash TEXT NOT NULL UNIQUE,
    key_prefix TEXT NOT NULL,
    name TEXT NOT NULL,
    agent_id TEXT,
    permissions TEXT NOT NULL DEFAULT '["read"]',
    rate_limit INTEGER NOT NULL DEFAULT 120,
    expires_at TEXT,
    last_used_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL REFERENCES agents(id),
    external_id TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    started_at TEXT NOT NULL,
    ended_at TEXT,
    summary TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(agent_id);
CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

-- Messages are immutable after insert; decay status changes are system-level
CREATE TABLE IF NOT EXISTS session_messages (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    agent_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    decay_status TEXT NOT NULL DEFAULT 'active',
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON session_messages(session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_agent_status ON session_messages(agent_id, decay_status);
"#;

/// 0002: The four typed memory tables plus projects
const MIGRATION_0002_UP: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    content TEXT NOT NULL,
    subject TEXT,
    confidence REAL NOT NULL DEFAULT 1.0,
    source TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    valid_from TEXT NOT NULL,
    valid_until TEXT,
    superseded_by TEXT,
    decay_status TEXT NOT NULL DEFAULT 'active',
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_facts_agent_status ON facts(agent_id, decay_status);
CREATE INDEX IF NOT EXISTS idx_facts_created ON facts(created_at);

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    title TEXT NOT NULL,
    decision TEXT NOT NULL,
    rationale TEXT,
    alternatives TEXT NOT NULL DEFAULT '[]',
    context TEXT,
    session_id TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    decay_status TEXT NOT NULL DEFAULT 'active',
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_decisions_agent_status ON decisions(agent_id, decay_status);
CREATE INDEX IF NOT EXISTS idx_decisions_session ON decisions(session_id);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    project_id TEXT,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'not_started',
    priority INTEGER NOT NULL DEFAULT 50,
    assignee TEXT,
    due_date TEXT,
    blocked_by TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    decay_status TEXT NOT NULL DEFAULT 'active',
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_agent_status ON tasks(agent_id, decay_status);
CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_task_status ON tasks(status);

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    project_id TEXT,
    title TEXT NOT NULL,
    event_type TEXT NOT NULL,
    description TEXT,
    outcome TEXT,
    caused_by TEXT,
    severity TEXT NOT NULL DEFAULT 'info',
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    occurred_at TEXT NOT NULL,
    resolved_at TEXT,
    decay_status TEXT NOT NULL DEFAULT 'active',
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_agent_status ON events(agent_id, decay_status);
CREATE INDEX IF NOT EXISTS idx_events_occurred ON events(occurred_at);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    slug TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(agent_id, slug)
);

CREATE INDEX IF NOT EXISTS idx_projects_agent ON projects(agent_id);
"#;

/// 0003: Typed edge graph and decay policies (seeded defaults)
const MIGRATION_0003_UP: &str = r#"
-- Edge endpoints are intentionally not foreign keys: resolution must
-- tolerate dangling references.
CREATE TABLE IF NOT EXISTS memory_edges (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(source_type, source_id, target_type, target_id, relation)
);

CREATE INDEX IF NOT EXISTS idx_edges_agent_source ON memory_edges(agent_id, source_type, source_id);
CREATE INDEX IF NOT EXISTS idx_edges_agent_target ON memory_edges(agent_id, target_type, target_id);

CREATE TABLE IF NOT EXISTS decay_policies (
    id TEXT PRIMARY KEY,
    agent_id TEXT,
    memory_type TEXT NOT NULL,
    ttl_days INTEGER,
    access_boost REAL NOT NULL DEFAULT 1.5,
    min_accesses INTEGER NOT NULL DEFAULT 3,
    created_at TEXT NOT NULL,
    UNIQUE(agent_id, memory_type)
);

-- Global defaults: NULL ttl means the type never auto-decays
INSERT OR IGNORE INTO decay_policies (id, agent_id, memory_type, ttl_days, access_boost, min_accesses, created_at) VALUES
    ('policy-global-session-message', NULL, 'session_message', 30, 1.5, 3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    ('policy-global-fact', NULL, 'fact', 90, 1.5, 3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    ('policy-global-event', NULL, 'event', 180, 1.5, 3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    ('policy-global-decision', NULL, 'decision', NULL, 1.5, 3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    ('policy-global-task', NULL, 'task', NULL, 1.5, 3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
"#;

/// 0004: Append-only analytics query log
const MIGRATION_0004_UP: &str = r#"
CREATE TABLE IF NOT EXISTS query_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT,
    endpoint TEXT NOT NULL,
    query_text TEXT,
    latency_ms INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_query_log_created ON query_log(created_at);
CREATE INDEX IF NOT EXISTS idx_query_log_agent ON query_log(agent_id);
"#;

/// Apply pending migrations. Returns how many were applied.
pub fn apply_migrations(conn: &mut rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        let recorded: bool = conn
            .query_row(
                "SELECT 1 FROM _migrations WHERE name = ?1",
                [migration.name],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if recorded {
            continue;
        }

        tracing::info!("Applying migration {}", migration.name);

        let tx = conn.transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute(
            "INSERT INTO _migrations (name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            [migration.name],
        )?;
        tx.commit()?;

        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_lexicographically_ordered() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].name < pair[1].name);
        }
    }

    #[test]
    fn apply_is_idempotent() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        let first = apply_migrations(&mut conn).unwrap();
        assert_eq!(first as usize, MIGRATIONS.len());
        let second = apply_migrations(&mut conn).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn ledger_records_every_name() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());
    }

    #[test]
    fn default_policies_seeded() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        let ttl: Option<i64> = conn
            .query_row(
                "SELECT ttl_days FROM decay_policies WHERE agent_id IS NULL AND memory_type = 'decision'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(ttl, None);
        let ttl: Option<i64> = conn
            .query_row(
                "SELECT ttl_days FROM decay_policies WHERE agent_id IS NULL AND memory_type = 'fact'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(ttl, Some(90));
    }
}
