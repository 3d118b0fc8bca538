//! Durable, agent-scoped knowledge storage.
//!
//! Three logical tables back one agent: keyed knowledge entries, a pattern
//! frequency table, and the append-only learning-data log. The [`KnowledgeStore`]
//! trait defines the persistence seam; [`KnowledgeBase`] is the SQLite-backed
//! implementation with an in-memory read cache.

mod sqlite;

pub use sqlite::KnowledgeBase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::experience::{LearningData, LearningType};

/// A durable keyed fact about the agent's world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Key, unique within the agent's namespace.
    pub key: String,
    /// Opaque serializable payload.
    pub value: serde_json::Value,
    /// Grouping category.
    pub category: String,
    /// Confidence in the fact (0.0 - 1.0).
    pub confidence: f64,
    /// When the entry was first stored.
    pub created_at: DateTime<Utc>,
    /// When the entry was last overwritten.
    pub updated_at: DateTime<Utc>,
}

/// One (name, canonical signature) pattern row with its recurrence count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEntry {
    /// Pattern name supplied by the caller.
    pub pattern_name: String,
    /// Canonical signature of the payload.
    pub signature: String,
    /// The associated payload.
    pub pattern_data: serde_json::Value,
    /// Recurrence count; never decremented.
    pub frequency: u64,
    /// First sighting.
    pub first_seen: DateTime<Utc>,
    /// Most recent sighting.
    pub last_seen: DateTime<Utc>,
}

/// Row counts and cache size for one agent's store.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    /// Owning agent.
    pub agent_id: String,
    /// Knowledge entries stored.
    pub knowledge_count: u64,
    /// Pattern rows stored.
    pub pattern_count: u64,
    /// Learning-data rows stored.
    pub learning_data_count: u64,
    /// Entries currently held in the read cache.
    pub cache_size: usize,
}

/// Persistence operations for one agent's knowledge, patterns, and
/// learning-data log.
///
/// Write failures surface as [`crate::error::StorageError`]; lookups of
/// unknown keys or patterns are a normal `None`/empty result, never an error.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Upsert a knowledge entry. Overwrites the value and refreshes
    /// `updated_at` when the key exists; never creates a duplicate row.
    async fn store_knowledge(
        &self,
        key: &str,
        value: &serde_json::Value,
        category: &str,
        confidence: f64,
    ) -> StorageResult<()>;

    /// Cache-first lookup of a knowledge value.
    async fn retrieve_knowledge(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// All knowledge entries in a category, most recently updated first.
    async fn get_knowledge_by_category(&self, category: &str)
        -> StorageResult<Vec<KnowledgeEntry>>;

    /// Record a pattern sighting: insert on first sighting of the
    /// (name, signature) pair, otherwise increment its frequency.
    async fn store_pattern(&self, name: &str, data: &serde_json::Value) -> StorageResult<()>;

    /// All pattern rows for a name, most frequent first.
    async fn get_patterns(&self, name: &str) -> StorageResult<Vec<PatternEntry>>;

    /// Append a learning-data record. Never overwrites.
    async fn store_learning_data(&self, record: &LearningData) -> StorageResult<()>;

    /// Learning-data rows, most recent first, optionally filtered by type.
    async fn get_learning_history(
        &self,
        learning_type: Option<LearningType>,
        limit: usize,
    ) -> StorageResult<Vec<LearningData>>;

    /// Row counts and cache size.
    async fn get_statistics(&self) -> StorageResult<KnowledgeStats>;
}
