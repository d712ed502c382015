//! Two-Stage Near-Duplicate Detection
//!
//! Stage one is syntactic (trigram similarity over the canonical content of
//! active same-agent rows); stage two is semantic (cosine over non-null
//! embeddings) and only runs when stage one found nothing and an embedder is
//! configured. The thresholds are part of the contract.
//!
//! Failures degrade: a broken syntactic stage falls through to the semantic
//! stage, and a fully failed detector reports "no match" rather than erroring
//! the write path.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::embeddings::vector_to_bytes;
use crate::memory::MemoryKind;
use crate::storage::{Result, Storage};

/// Stage-one cutoff: trigram similarity of canonical content.
pub const SYNTACTIC_THRESHOLD: f64 = 0.6;

/// Stage-two cutoff: cosine similarity of embeddings.
pub const SEMANTIC_THRESHOLD: f64 = 0.92;

/// Which stage produced the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStage {
    Syntactic,
    Semantic,
}

/// A positive near-duplicate result.
#[derive(Debug, Clone, Serialize)]
pub struct DedupMatch {
    pub id: String,
    pub similarity: f64,
    pub stage: DedupStage,
}

/// Run both stages against a candidate text. Only `active` rows of the same
/// agent are candidates; session messages and projects never participate.
pub fn find_duplicate(
    storage: &Storage,
    kind: MemoryKind,
    agent_id: &str,
    candidate: &str,
) -> Result<Option<DedupMatch>> {
    if !kind.dedups() || candidate.trim().is_empty() {
        return Ok(None);
    }

    match syntactic_stage(storage, kind, agent_id, candidate) {
        Ok(Some(m)) => return Ok(Some(m)),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("syntactic dedup stage failed, trying semantic: {}", e);
        }
    }

    match semantic_stage(storage, kind, agent_id, candidate) {
        Ok(m) => Ok(m),
        Err(e) => {
            tracing::warn!("semantic dedup stage failed, treating as no match: {}", e);
            Ok(None)
        }
    }
}

fn syntactic_stage(
    storage: &Storage,
    kind: MemoryKind,
    agent_id: &str,
    candidate: &str,
) -> Result<Option<DedupMatch>> {
    let sql = format!(
        "SELECT id, trgm_sim({expr}, ?1) AS sim FROM {table}
         WHERE agent_id = ?2 AND decay_status = 'active'
         ORDER BY sim DESC LIMIT 1",
        expr = kind.content_expr(),
        table = kind.table(),
    );

    let reader = storage.lock_reader()?;
    let top: Option<(String, f64)> = reader
        .query_row(&sql, params![candidate, agent_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;

    Ok(top
        .filter(|(_, sim)| *sim >= SYNTACTIC_THRESHOLD)
        .map(|(id, similarity)| DedupMatch {
            id,
            similarity,
            stage: DedupStage::Syntactic,
        }))
}

fn semantic_stage(
    storage: &Storage,
    kind: MemoryKind,
    agent_id: &str,
    candidate: &str,
) -> Result<Option<DedupMatch>> {
    let Some(embedder) = storage.embedder() else {
        return Ok(None);
    };
    let query = match embedder.embed(candidate) {
        Ok(vector) => vector_to_bytes(&vector),
        Err(e) => {
            tracing::debug!("candidate embedding failed in dedup: {}", e);
            return Ok(None);
        }
    };

    let sql = format!(
        "SELECT id, vec_sim(embedding, ?1) AS sim FROM {table}
         WHERE agent_id = ?2 AND decay_status = 'active' AND embedding IS NOT NULL
         ORDER BY sim DESC LIMIT 1",
        table = kind.table(),
    );

    let reader = storage.lock_reader()?;
    let top: Option<(String, f64)> = reader
        .query_row(&sql, params![query, agent_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;

    Ok(top
        .filter(|(_, sim)| *sim >= SEMANTIC_THRESHOLD)
        .map(|(id, similarity)| DedupMatch {
            id,
            similarity,
            stage: DedupStage::Semantic,
        }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedder, EmbeddingError};
    use crate::memory::{NewAgent, NewFact};
    use std::sync::Arc;

    /// Embeds every text to the same vector: semantic similarity is always 1.
    struct ConstEmbedder;

    impl Embedder for ConstEmbedder {
        fn name(&self) -> &str {
            "const"
        }
        fn dimensions(&self) -> usize {
            4
        }
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.5, 0.5, 0.5, 0.5])
        }
    }

    fn storage_with(embedder: Option<Arc<dyn Embedder>>) -> (tempfile::TempDir, Storage, String) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(Some(dir.path().join("test.db")), embedder).unwrap();
        let agent_id = storage
            .create_agent(NewAgent {
                slug: "dedup-test".to_string(),
                display_name: "Dedup".to_string(),
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

    #[test]
    fn syntactic_stage_catches_identical_content() {
        let (_dir, storage, agent_id) = storage_with(None);
        let existing = storage
            .insert_fact(&agent_id, &fact("TypeScript is the primary language used here"))
            .unwrap();

        let matched = find_duplicate(
            &storage,
            MemoryKind::Fact,
            &agent_id,
            "TypeScript is the primary language used here",
        )
        .unwrap()
        .unwrap();

        assert_eq!(matched.id, existing.id);
        assert_eq!(matched.stage, DedupStage::Syntactic);
        assert!(matched.similarity >= SYNTACTIC_THRESHOLD);
    }

    #[test]
    fn semantic_stage_runs_when_syntactic_misses() {
        let (_dir, storage, agent_id) = storage_with(Some(Arc::new(ConstEmbedder)));
        let existing = storage
            .insert_fact(&agent_id, &fact("deployment runs on kubernetes"))
            .unwrap();

        // Lexically disjoint; the constant embedder makes it semantically identical
        let matched = find_duplicate(
            &storage,
            MemoryKind::Fact,
            &agent_id,
            "quarterly finance summary",
        )
        .unwrap()
        .unwrap();

        assert_eq!(matched.id, existing.id);
        assert_eq!(matched.stage, DedupStage::Semantic);
        assert!(matched.similarity >= SEMANTIC_THRESHOLD);
    }

    #[test]
    fn no_embedder_means_syntactic_only() {
        let (_dir, storage, agent_id) = storage_with(None);
        storage
            .insert_fact(&agent_id, &fact("deployment runs on kubernetes"))
            .unwrap();

        let matched = find_duplicate(
            &storage,
            MemoryKind::Fact,
            &agent_id,
            "quarterly finance summary",
        )
        .unwrap();
        assert!(matched.is_none());
    }

    #[test]
    fn other_agents_are_invisible() {
        let (_dir, storage, agent_id) = storage_with(None);
        storage
            .insert_fact(&agent_id, &fact("shared wording between tenants"))
            .unwrap();

        let other = storage
            .create_agent(NewAgent {
                slug: "other-agent".to_string(),
                display_name: "Other".to_string(),
                description: None,
                core_memory: None,
                config: None,
            })
            .unwrap();

        let matched = find_duplicate(
            &storage,
            MemoryKind::Fact,
            &other.id,
            "shared wording between tenants",
        )
        .unwrap();
        assert!(matched.is_none());
    }

    #[test]
    fn inactive_rows_are_not_candidates() {
        let (_dir, storage, agent_id) = storage_with(None);
        let existing = storage
            .insert_fact(&agent_id, &fact("cooling rows leave the candidate set"))
            .unwrap();

        {
            let writer = storage.lock_writer().unwrap();
            writer
                .execute(
                    "UPDATE facts SET decay_status = 'cooling' WHERE id = ?1",
                    params![existing.id],
                )
                .unwrap();
        }

        let matched = find_duplicate(
            &storage,
            MemoryKind::Fact,
            &agent_id,
            "cooling rows leave the candidate set",
        )
        .unwrap();
        assert!(matched.is_none());
    }

    #[test]
    fn session_messages_never_dedup() {
        let (_dir, storage, agent_id) = storage_with(None);
        let matched = find_duplicate(
            &storage,
            MemoryKind::SessionMessage,
            &agent_id,
            "anything at all",
        )
        .unwrap();
        assert!(matched.is_none());
    }
}
