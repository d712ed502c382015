//! SQLite Storage Implementation
//!
//! One writer and one reader connection behind mutexes; all methods take
//! `&self` so the server can share `Arc<Storage>` across handlers. The
//! semantic and lexical retrieval arms are plain SQL thanks to the
//! `vec_sim` / `trgm_sim` scalar functions registered on both connections.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use lru::LruCache;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::embeddings::{vector_from_bytes, vector_to_bytes, cosine_similarity, Embedder};
use crate::memory::{
    validate_slug, Agent, AgentPatch, ApiKey, DecayPolicy, MemoryKind, NewAgent, NewMessage,
    NewSession, Permission, Role, Session, SessionMessage,
};
use crate::text::trigram_similarity;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Missing or malformed caller input
    #[error("{0}")]
    InvalidArgument(String),
    /// Unknown id or slug
    #[error("{0} not found")]
    NotFound(String),
    /// Unique-constraint violation or near-duplicate match
    #[error("{message}")]
    Conflict {
        message: String,
        existing_id: Option<String>,
        similarity: Option<f64>,
    },
    /// A required capability (embedder) is absent
    #[error("{0}")]
    CapabilityUnavailable(String),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// JSON MERGE-PATCH
// ============================================================================

/// RFC 7396 merge-patch: object members merge recursively, `null` removes the
/// key, anything else replaces the target wholesale.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_obj) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            if let Some(obj) = target.as_object_mut() {
                for (key, value) in patch_obj {
                    if value.is_null() {
                        obj.remove(key);
                    } else if value.is_object() {
                        let entry = obj
                            .entry(key.clone())
                            .or_insert_with(|| Value::Object(serde_json::Map::new()));
                        merge_patch(entry, value);
                    } else {
                        obj.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

// ============================================================================
// STORAGE
// ============================================================================

/// Per-table counts shown in agent detail responses.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct AgentCounts {
    pub sessions: i64,
    pub session_messages: i64,
    pub facts: i64,
    pub decisions: i64,
    pub tasks: i64,
    pub events: i64,
    pub projects: i64,
}

/// Main storage struct.
///
/// The only in-process state besides the connections: the configured
/// embedder, an LRU cache of query embeddings, and the slug→agent-id cache
/// (opportunistic, never invalidated; slug renames are unsupported).
pub struct Storage {
    pub(crate) writer: Mutex<Connection>,
    pub(crate) reader: Mutex<Connection>,
    embedder: Option<Arc<dyn Embedder>>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    slug_cache: Mutex<LruCache<String, String>>,
}

impl Storage {
    /// Apply PRAGMAs and register the similarity scalar functions.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Self::register_functions(conn)?;

        Ok(())
    }

    /// Register `trgm_sim(text, text)` and `vec_sim(blob, blob)`.
    ///
    /// Both are deterministic and total: NULL or malformed input scores 0.0
    /// rather than erroring, so retrieval queries never abort mid-scan.
    fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
        conn.create_scalar_function(
            "trgm_sim",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let a: Option<String> = ctx.get(0)?;
                let b: Option<String> = ctx.get(1)?;
                Ok(match (a, b) {
                    (Some(a), Some(b)) => trigram_similarity(&a, &b),
                    _ => 0.0,
                })
            },
        )?;

        conn.create_scalar_function(
            "vec_sim",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let a: Option<Vec<u8>> = ctx.get(0)?;
                let b: Option<Vec<u8>> = ctx.get(1)?;
                let sim = match (a, b) {
                    (Some(a), Some(b)) => match (vector_from_bytes(&a), vector_from_bytes(&b)) {
                        (Some(a), Some(b)) => cosine_similarity(&a, &b) as f64,
                        _ => 0.0,
                    },
                    _ => 0.0,
                };
                Ok(sim)
            },
        )?;

        Ok(())
    }

    /// Open (or create) the database and apply pending migrations.
    pub fn open(db_path: Option<PathBuf>, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("io", "hexmem", "core").ok_or_else(|| {
                    StoreError::Init("Could not determine project directories".to_string())
                })?;

                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(data_dir, perms);
                }
                data_dir.join("hexmem.db")
            }
        };

        let mut writer_conn = Connection::open(&path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        // Migrations apply on the writer only; a failure aborts startup
        super::migrations::apply_migrations(&mut writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            embedder,
            // SAFETY: constants are non-zero
            query_cache: Mutex::new(LruCache::new(NonZeroUsize::new(100).expect("non-zero"))),
            slug_cache: Mutex::new(LruCache::new(NonZeroUsize::new(1024).expect("non-zero"))),
        })
    }

    /// Liveness probe used by `/health`.
    pub fn ping(&self) -> Result<()> {
        let reader = self.lock_reader()?;
        reader.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Direct writer access. The escape hatch for maintenance tooling and
    /// tests; application code goes through the typed methods.
    pub fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))
    }

    /// Direct reader access; see [`Storage::lock_writer`].
    pub fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))
    }

    // ========================================================================
    // EMBEDDER ACCESS
    // ========================================================================

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.embedder.as_ref()
    }

    pub fn embedder_name(&self) -> Option<String> {
        self.embedder.as_ref().map(|e| e.name().to_string())
    }

    pub fn require_embedder(&self) -> Result<&Arc<dyn Embedder>> {
        self.embedder.as_ref().ok_or_else(|| {
            StoreError::CapabilityUnavailable("embedder required and unavailable".to_string())
        })
    }

    /// Best-effort embedding for a row about to be written. `None` leaves the
    /// embedding column null; the row stays reachable through the lexical arm.
    pub fn try_embed(&self, text: &str) -> Option<Vec<u8>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text) {
            Ok(vector) => Some(vector_to_bytes(&vector)),
            Err(e) => {
                tracing::warn!("embedding failed, persisting without vector: {}", e);
                None
            }
        }
    }

    /// Best-effort query embedding with an LRU cache in front.
    pub fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;

        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(vector) = cache.get(query) {
                return Some(vector.clone());
            }
        }

        match embedder.embed(query) {
            Ok(vector) => {
                if let Ok(mut cache) = self.query_cache.lock() {
                    cache.put(query.to_string(), vector.clone());
                }
                Some(vector)
            }
            Err(e) => {
                tracing::warn!("query embedding failed, semantic arm skipped: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // TIMESTAMP & JSON HELPERS
    // ========================================================================

    pub(crate) fn parse_timestamp(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Invalid {} timestamp '{}': {}", field_name, value, e),
                    )),
                )
            })
    }

    pub(crate) fn opt_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
        value.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
    }

    pub(crate) fn json_or_default(value: String) -> Value {
        serde_json::from_str(&value).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
    }

    pub(crate) fn tags_from_json(value: String) -> Vec<String> {
        serde_json::from_str(&value).unwrap_or_default()
    }

    // ========================================================================
    // AGENTS
    // ========================================================================

    /// Create an agent. Slug must match `^[a-z0-9][a-z0-9_-]*$` and be unique.
    pub fn create_agent(&self, input: NewAgent) -> Result<Agent> {
        if !validate_slug(&input.slug) {
            return Err(StoreError::InvalidArgument(format!(
                "invalid slug '{}': expected ^[a-z0-9][a-z0-9_-]*$",
                input.slug
            )));
        }
        if input.display_name.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "display_name is required".to_string(),
            ));
        }

        let now = Utc::now();
        let agent = Agent {
            id: Uuid::new_v4().to_string(),
            slug: input.slug,
            display_name: input.display_name,
            description: input.description,
            core_memory: input
                .core_memory
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            config: input
                .config
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            created_at: now,
            updated_at: now,
        };

        let writer = self.lock_writer()?;
        let inserted = writer.execute(
            "INSERT INTO agents (id, slug, display_name, description, core_memory, config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(slug) DO NOTHING",
            params![
                agent.id,
                agent.slug,
                agent.display_name,
                agent.description,
                serde_json::to_string(&agent.core_memory)?,
                serde_json::to_string(&agent.config)?,
                agent.created_at.to_rfc3339(),
                agent.updated_at.to_rfc3339(),
            ],
        )?;
        drop(writer);

        if inserted == 0 {
            let existing_id = self.resolve_agent_id(&agent.slug).ok();
            return Err(StoreError::Conflict {
                message: format!("agent slug '{}' already exists", agent.slug),
                existing_id,
                similarity: None,
            });
        }

        Ok(agent)
    }

    /// Resolve an id-or-slug reference to the agent's UUID.
    pub fn resolve_agent_id(&self, id_or_slug: &str) -> Result<String> {
        if Uuid::parse_str(id_or_slug).is_ok() {
            return Ok(id_or_slug.to_string());
        }

        if let Ok(mut cache) = self.slug_cache.lock() {
            if let Some(id) = cache.get(id_or_slug) {
                return Ok(id.clone());
            }
        }

        let reader = self.lock_reader()?;
        let id: Option<String> = reader
            .query_row(
                "SELECT id FROM agents WHERE slug = ?1",
                params![id_or_slug],
                |row| row.get(0),
            )
            .optional()?;
        drop(reader);

        match id {
            Some(id) => {
                if let Ok(mut cache) = self.slug_cache.lock() {
                    cache.put(id_or_slug.to_string(), id.clone());
                }
                Ok(id)
            }
            None => Err(StoreError::NotFound(format!("agent '{}'", id_or_slug))),
        }
    }

    fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<Agent> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(Agent {
            id: row.get("id")?,
            slug: row.get("slug")?,
            display_name: row.get("display_name")?,
            description: row.get("description")?,
            core_memory: Self::json_or_default(row.get("core_memory")?),
            config: Self::json_or_default(row.get("config")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    /// Get an agent by UUID or slug.
    pub fn get_agent(&self, id_or_slug: &str) -> Result<Agent> {
        let id = self.resolve_agent_id(id_or_slug)?;
        let reader = self.lock_reader()?;
        let agent = reader
            .query_row(
                "SELECT * FROM agents WHERE id = ?1",
                params![id],
                Self::row_to_agent,
            )
            .optional()?;
        agent.ok_or_else(|| StoreError::NotFound(format!("agent '{}'", id_or_slug)))
    }

    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare("SELECT * FROM agents ORDER BY created_at")?;
        let agents = stmt
            .query_map([], Self::row_to_agent)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(agents)
    }

    /// Update display name, description, or config.
    pub fn update_agent(&self, id_or_slug: &str, patch: AgentPatch) -> Result<Agent> {
        let mut agent = self.get_agent(id_or_slug)?;

        if let Some(display_name) = patch.display_name {
            agent.display_name = display_name;
        }
        if let Some(description) = patch.description {
            agent.description = Some(description);
        }
        if let Some(config) = patch.config {
            agent.config = config;
        }
        agent.updated_at = Utc::now();

        let writer = self.lock_writer()?;
        writer.execute(
            "UPDATE agents SET display_name = ?1, description = ?2, config = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                agent.display_name,
                agent.description,
                serde_json::to_string(&agent.config)?,
                agent.updated_at.to_rfc3339(),
                agent.id,
            ],
        )?;

        Ok(agent)
    }

    /// Merge-patch the agent's core memory. The read-modify-write happens
    /// under the writer lock, so the whole update is atomic.
    pub fn patch_core_memory(&self, id_or_slug: &str, patch: &Value) -> Result<Agent> {
        let id = self.resolve_agent_id(id_or_slug)?;
        let now = Utc::now();

        let writer = self.lock_writer()?;
        let current: Option<String> = writer
            .query_row(
                "SELECT core_memory FROM agents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.ok_or_else(|| StoreError::NotFound(format!("agent '{}'", id)))?;

        let mut core_memory = Self::json_or_default(current);
        merge_patch(&mut core_memory, patch);

        writer.execute(
            "UPDATE agents SET core_memory = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&core_memory)?, now.to_rfc3339(), id],
        )?;
        drop(writer);

        self.get_agent(&id)
    }

    /// Per-table item counts for the agent detail response.
    pub fn agent_counts(&self, agent_id: &str) -> Result<AgentCounts> {
        let reader = self.lock_reader()?;
        let count = |table: &str| -> Result<i64> {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE agent_id = ?1", table);
            Ok(reader.query_row(&sql, params![agent_id], |row| row.get(0))?)
        };
        Ok(AgentCounts {
            sessions: count("sessions")?,
            session_messages: count("session_messages")?,
            facts: count("facts")?,
            decisions: count("decisions")?,
            tasks: count("tasks")?,
            events: count("events")?,
            projects: count("projects")?,
        })
    }

    // ========================================================================
    // API KEYS
    // ========================================================================

    /// Persist a key record. Hashing happens at the auth layer; the store
    /// never sees raw keys.
    pub fn insert_api_key(&self, key: &ApiKey) -> Result<()> {
        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO api_keys (id, key_hash, key_prefix, name, agent_id, permissions, rate_limit, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                key.id,
                key.key_hash,
                key.key_prefix,
                key.name,
                key.agent_id,
                serde_json::to_string(&key.permissions)?,
                key.rate_limit,
                key.expires_at.map(|t| t.to_rfc3339()),
                key.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn row_to_api_key(row: &rusqlite::Row) -> rusqlite::Result<ApiKey> {
        let created_at: String = row.get("created_at")?;
        let permissions_json: String = row.get("permissions")?;
        let permissions: Vec<Permission> =
            serde_json::from_str(&permissions_json).unwrap_or_default();
        Ok(ApiKey {
            id: row.get("id")?,
            key_hash: row.get("key_hash")?,
            key_prefix: row.get("key_prefix")?,
            name: row.get("name")?,
            agent_id: row.get("agent_id")?,
            permissions,
            rate_limit: row.get("rate_limit")?,
            expires_at: Self::opt_timestamp(row.get("expires_at")?),
            last_used_at: Self::opt_timestamp(row.get("last_used_at")?),
            revoked_at: Self::opt_timestamp(row.get("revoked_at")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
        })
    }

    pub fn list_api_keys(&self) -> Result<Vec<ApiKey>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare("SELECT * FROM api_keys ORDER BY created_at")?;
        let keys = stmt
            .query_map([], Self::row_to_api_key)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    pub fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let reader = self.lock_reader()?;
        let key = reader
            .query_row(
                "SELECT * FROM api_keys WHERE key_hash = ?1",
                params![key_hash],
                Self::row_to_api_key,
            )
            .optional()?;
        Ok(key)
    }

    /// Soft-revoke. Revoking twice is a no-op.
    pub fn revoke_api_key(&self, id: &str) -> Result<()> {
        let writer = self.lock_writer()?;
        let exists: bool = writer
            .query_row("SELECT 1 FROM api_keys WHERE id = ?1", params![id], |_| {
                Ok(true)
            })
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::NotFound(format!("api key '{}'", id)));
        }
        writer.execute(
            "UPDATE api_keys SET revoked_at = COALESCE(revoked_at, ?1) WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Best-effort `last_used_at` bump; auth never fails on it.
    pub fn touch_api_key(&self, id: &str) {
        if let Ok(writer) = self.writer.lock() {
            let _ = writer.execute(
                "UPDATE api_keys SET last_used_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            );
        }
    }

    // ========================================================================
    // SESSIONS & MESSAGES
    // ========================================================================

    pub fn create_session(&self, input: NewSession) -> Result<Session> {
        let agent_id = self.resolve_agent_id(&input.agent_id)?;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            agent_id,
            external_id: input.external_id,
            metadata: input
                .metadata
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            started_at: now,
            ended_at: None,
            summary: None,
        };

        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO sessions (id, agent_id, external_id, metadata, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.agent_id,
                session.external_id,
                serde_json::to_string(&session.metadata)?,
                session.started_at.to_rfc3339(),
            ],
        )?;

        Ok(session)
    }

    pub(crate) fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        let started_at: String = row.get("started_at")?;
        Ok(Session {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            external_id: row.get("external_id")?,
            metadata: Self::json_or_default(row.get("metadata")?),
            started_at: Self::parse_timestamp(&started_at, "started_at")?,
            ended_at: Self::opt_timestamp(row.get("ended_at")?),
            summary: row.get("summary")?,
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Session> {
        let reader = self.lock_reader()?;
        let session = reader
            .query_row(
                "SELECT * FROM sessions WHERE id = ?1",
                params![id],
                Self::row_to_session,
            )
            .optional()?;
        session.ok_or_else(|| StoreError::NotFound(format!("session '{}'", id)))
    }

    pub fn list_sessions(&self, agent: Option<&str>) -> Result<Vec<Session>> {
        let agent_id = match agent {
            Some(a) => Some(self.resolve_agent_id(a)?),
            None => None,
        };
        let reader = self.lock_reader()?;
        let mut sessions = Vec::new();
        match agent_id {
            Some(agent_id) => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM sessions WHERE agent_id = ?1 ORDER BY started_at DESC",
                )?;
                for row in stmt.query_map(params![agent_id], Self::row_to_session)? {
                    sessions.push(row?);
                }
            }
            None => {
                let mut stmt = reader.prepare("SELECT * FROM sessions ORDER BY started_at DESC")?;
                for row in stmt.query_map([], Self::row_to_session)? {
                    sessions.push(row?);
                }
            }
        }
        Ok(sessions)
    }

    pub fn session_message_count(&self, session_id: &str) -> Result<i64> {
        let reader = self.lock_reader()?;
        Ok(reader.query_row(
            "SELECT COUNT(*) FROM session_messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?)
    }

    pub(crate) fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<SessionMessage> {
        let created_at: String = row.get("created_at")?;
        let role: String = row.get("role")?;
        let decay_status: String = row.get("decay_status")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        Ok(SessionMessage {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            agent_id: row.get("agent_id")?,
            role: Role::parse_name(&role).unwrap_or(Role::User),
            content: row.get("content")?,
            metadata: Self::json_or_default(row.get("metadata")?),
            has_embedding: embedding.is_some(),
            decay_status: crate::memory::DecayStatus::parse_name(&decay_status)
                .unwrap_or_default(),
            access_count: row.get("access_count")?,
            last_accessed_at: Self::opt_timestamp(row.get("last_accessed_at")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
        })
    }

    /// Insert a message row. Ordering within a session is by `created_at`;
    /// concurrent writers to the same session order by wall clock only.
    pub fn insert_message(
        &self,
        session: &Session,
        input: &NewMessage,
        embedding: Option<Vec<u8>>,
    ) -> Result<SessionMessage> {
        let now = Utc::now();
        let message = SessionMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            agent_id: session.agent_id.clone(),
            role: input.role,
            content: input.content.clone(),
            metadata: input
                .metadata
                .clone()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            has_embedding: embedding.is_some(),
            decay_status: crate::memory::DecayStatus::Active,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
        };

        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO session_messages (id, session_id, agent_id, role, content, metadata, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                message.id,
                message.session_id,
                message.agent_id,
                message.role.as_str(),
                message.content,
                serde_json::to_string(&message.metadata)?,
                embedding,
                now.to_rfc3339(),
            ],
        )?;

        Ok(message)
    }

    /// All messages of a session, oldest first.
    pub fn list_messages(&self, session_id: &str) -> Result<Vec<SessionMessage>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM session_messages WHERE session_id = ?1 ORDER BY created_at, id",
        )?;
        let messages = stmt
            .query_map(params![session_id], Self::row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// The `limit` most recent messages of a session, returned oldest-first
    /// for use as extraction context.
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<SessionMessage>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM session_messages WHERE session_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let mut messages = stmt
            .query_map(params![session_id, limit as i64], Self::row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Terminal transition. Ending an already-ended session is rejected.
    pub fn end_session(&self, id: &str, summary: Option<String>) -> Result<Session> {
        let mut session = self.get_session(id)?;
        if session.is_ended() {
            return Err(StoreError::InvalidArgument(format!(
                "session '{}' already ended",
                id
            )));
        }

        let now = Utc::now();
        let writer = self.lock_writer()?;
        writer.execute(
            "UPDATE sessions SET ended_at = ?1, summary = ?2 WHERE id = ?3",
            params![now.to_rfc3339(), summary, id],
        )?;

        session.ended_at = Some(now);
        session.summary = summary;
        Ok(session)
    }

    // ========================================================================
    // ACCESS ACCOUNTING & REVIVAL
    // ========================================================================

    /// Atomic read-through accounting. Callers on the recall path swallow
    /// the error.
    pub fn bump_access(&self, kind: MemoryKind, id: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET access_count = access_count + 1, last_accessed_at = ?1 WHERE id = ?2",
            kind.table()
        );
        let writer = self.lock_writer()?;
        writer.execute(&sql, params![Utc::now().to_rfc3339(), id])?;
        Ok(())
    }

    /// Move a cooling/archived item back to active. Returns whether a row
    /// transitioned.
    pub fn revive(&self, kind: MemoryKind, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE {} SET decay_status = 'active',
                           access_count = access_count + 1,
                           last_accessed_at = ?1,
                           updated_at = ?1
             WHERE id = ?2 AND decay_status IN ('cooling', 'archived')",
            kind.table()
        );
        let writer = self.lock_writer()?;
        let changed = writer.execute(&sql, params![now, id])?;
        Ok(changed > 0)
    }

    // ========================================================================
    // DECAY POLICIES
    // ========================================================================

    pub(crate) fn row_to_policy(row: &rusqlite::Row) -> rusqlite::Result<DecayPolicy> {
        let created_at: String = row.get("created_at")?;
        let memory_type: String = row.get("memory_type")?;
        Ok(DecayPolicy {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            memory_type: MemoryKind::parse_name(&memory_type).unwrap_or(MemoryKind::Fact),
            ttl_days: row.get("ttl_days")?,
            access_boost: row.get("access_boost")?,
            min_accesses: row.get("min_accesses")?,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
        })
    }

    /// Most-specific-wins policy resolution: the agent's own row beats the
    /// global default (`agent_id IS NULL`).
    pub fn resolve_policy(&self, agent_id: &str, kind: MemoryKind) -> Result<DecayPolicy> {
        let reader = self.lock_reader()?;
        let policy = reader
            .query_row(
                "SELECT * FROM decay_policies
                 WHERE memory_type = ?1 AND (agent_id = ?2 OR agent_id IS NULL)
                 ORDER BY (agent_id IS NULL) LIMIT 1",
                params![kind.as_str(), agent_id],
                Self::row_to_policy,
            )
            .optional()?;
        policy.ok_or_else(|| StoreError::NotFound(format!("decay policy for '{}'", kind)))
    }

    /// All policies applicable to an agent (its own plus globals).
    pub fn list_policies(&self, agent_id: Option<&str>) -> Result<Vec<DecayPolicy>> {
        let reader = self.lock_reader()?;
        let mut policies = Vec::new();
        match agent_id {
            Some(agent_id) => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM decay_policies
                     WHERE agent_id = ?1 OR agent_id IS NULL
                     ORDER BY memory_type, (agent_id IS NULL)",
                )?;
                for row in stmt.query_map(params![agent_id], Self::row_to_policy)? {
                    policies.push(row?);
                }
            }
            None => {
                let mut stmt =
                    reader.prepare("SELECT * FROM decay_policies ORDER BY memory_type")?;
                for row in stmt.query_map([], Self::row_to_policy)? {
                    policies.push(row?);
                }
            }
        }
        Ok(policies)
    }
}

// ============================================================================
// TESTS
// ============================================================================
