//! Storage Module
//!
//! SQLite-based storage layer with:
//! - Named migrations recorded in the `_migrations` ledger
//! - Embedding blobs with `vec_sim` cosine similarity in SQL
//! - Trigram lexical similarity via `trgm_sim`
//! - JSON merge-patch for agent core memory

mod edges;
mod items;
mod migrations;
mod sqlite;

pub use edges::EdgeFilter;
pub use items::{ListFilter, NodeSummary};
pub use migrations::{apply_migrations, Migration, MIGRATIONS};
pub use sqlite::{merge_patch, AgentCounts, Result, Storage, StoreError};
