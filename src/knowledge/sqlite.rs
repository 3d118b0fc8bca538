use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{KnowledgeEntry, KnowledgeStats, KnowledgeStore, PatternEntry};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::experience::{DataId, LearningData, LearningType};
use crate::patterns::canonical_signature;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed knowledge store with an in-memory read cache.
///
/// Writes take the cache write lock around the durable statement so the
/// cache can never disagree with the store; reads stay concurrent.
pub struct KnowledgeBase {
    agent_id: String,
    pool: SqlitePool,
    cache: RwLock<HashMap<String, KnowledgeEntry>>,
}

impl KnowledgeBase {
    /// Create a file-backed knowledge base for one agent.
    pub async fn new(agent_id: impl Into<String>, config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        Self::from_pool(agent_id, pool).await
    }

    /// Create an in-memory knowledge base, mainly for tests.
    pub async fn new_in_memory(agent_id: impl Into<String>) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // A single never-reaped connection keeps the in-memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        Self::from_pool(agent_id, pool).await
    }

    async fn from_pool(agent_id: impl Into<String>, pool: SqlitePool) -> StorageResult<Self> {
        let store = Self {
            agent_id: agent_id.into(),
            pool,
            cache: RwLock::new(HashMap::new()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!(agent_id = %self.agent_id, "Knowledge base migrations completed");
        Ok(())
    }

    /// Owning agent.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Drop every cached entry; subsequent reads fall through to SQLite.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        debug!(agent_id = %self.agent_id, "Knowledge cache cleared");
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KnowledgeStore for KnowledgeBase {
    async fn store_knowledge(
        &self,
        key: &str,
        value: &serde_json::Value,
        category: &str,
        confidence: f64,
    ) -> StorageResult<()> {
        let value_json = serde_json::to_string(value).map_err(|e| StorageError::Serialization {
            message: format!("Failed to serialize knowledge value: {}", e),
        })?;
        let now = Utc::now();

        // Hold the cache write lock across the durable write so a concurrent
        // reader can never observe a cache entry the store does not have.
        let mut cache = self.cache.write().await;

        // RETURNING reports the row's actual created_at, which on conflict
        // is the original insertion time, keeping the cache and the DB in
        // agreement even after a cache clear.
        let created_at: String = sqlx::query_scalar(
            r#"
            INSERT INTO knowledge_entries (agent_id, key, value, category, confidence, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_id, key) DO UPDATE SET
                value = excluded.value,
                category = excluded.category,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at
            RETURNING created_at
            "#,
        )
        .bind(&self.agent_id)
        .bind(key)
        .bind(&value_json)
        .bind(category)
        .bind(confidence)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        let created_at = parse_timestamp(&created_at);
        cache.insert(
            key.to_string(),
            KnowledgeEntry {
                key: key.to_string(),
                value: value.clone(),
                category: category.to_string(),
                confidence,
                created_at,
                updated_at: now,
            },
        );

        debug!(agent_id = %self.agent_id, key, category, "Knowledge stored");
        Ok(())
    }

    async fn retrieve_knowledge(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(key) {
                return Ok(Some(entry.value.clone()));
            }
        }

        let row: Option<KnowledgeRow> = sqlx::query_as(
            r#"
            SELECT key, value, category, confidence, created_at, updated_at
            FROM knowledge_entries
            WHERE agent_id = ? AND key = ?
            "#,
        )
        .bind(&self.agent_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let entry: KnowledgeEntry = row.into();
                // A writer may have committed a newer value between the
                // query above and this lock; never clobber it with the
                // fetched row.
                let mut cache = self.cache.write().await;
                let entry = cache.entry(key.to_string()).or_insert(entry);
                Ok(Some(entry.value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn get_knowledge_by_category(
        &self,
        category: &str,
    ) -> StorageResult<Vec<KnowledgeEntry>> {
        let rows: Vec<KnowledgeRow> = sqlx::query_as(
            r#"
            SELECT key, value, category, confidence, created_at, updated_at
            FROM knowledge_entries
            WHERE agent_id = ? AND category = ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(&self.agent_id)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn store_pattern(&self, name: &str, data: &serde_json::Value) -> StorageResult<()> {
        let signature = canonical_signature(data);
        let data_json = serde_json::to_string(data).map_err(|e| StorageError::Serialization {
            message: format!("Failed to serialize pattern data: {}", e),
        })?;
        let now = Utc::now().to_rfc3339();

        // Single upsert statement keeps the frequency increment atomic.
        sqlx::query(
            r#"
            INSERT INTO pattern_entries (agent_id, pattern_name, signature, pattern_data, frequency, first_seen, last_seen)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(agent_id, pattern_name, signature) DO UPDATE SET
                frequency = frequency + 1,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(&self.agent_id)
        .bind(name)
        .bind(&signature)
        .bind(&data_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(agent_id = %self.agent_id, pattern_name = name, "Pattern sighting recorded");
        Ok(())
    }

    async fn get_patterns(&self, name: &str) -> StorageResult<Vec<PatternEntry>> {
        let rows: Vec<PatternRow> = sqlx::query_as(
            r#"
            SELECT pattern_name, signature, pattern_data, frequency, first_seen, last_seen
            FROM pattern_entries
            WHERE agent_id = ? AND pattern_name = ?
            ORDER BY frequency DESC, last_seen DESC
            "#,
        )
        .bind(&self.agent_id)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn store_learning_data(&self, record: &LearningData) -> StorageResult<()> {
        let input = serde_json::to_string(&record.input_data).map_err(|e| {
            StorageError::Serialization {
                message: format!("Failed to serialize input_data: {}", e),
            }
        })?;
        let output = serde_json::to_string(&record.output_data).map_err(|e| {
            StorageError::Serialization {
                message: format!("Failed to serialize output_data: {}", e),
            }
        })?;
        let features = serde_json::to_string(&record.features).map_err(|e| {
            StorageError::Serialization {
                message: format!("Failed to serialize features: {}", e),
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO learning_data (data_id, agent_id, learning_type, input_data, output_data, features, reward, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.data_id.0)
        .bind(&record.agent_id)
        .bind(record.learning_type.as_str())
        .bind(&input)
        .bind(&output)
        .bind(&features)
        .bind(record.reward)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            agent_id = %self.agent_id,
            data_id = %record.data_id,
            learning_type = %record.learning_type,
            "Learning data appended"
        );
        Ok(())
    }

    async fn get_learning_history(
        &self,
        learning_type: Option<LearningType>,
        limit: usize,
    ) -> StorageResult<Vec<LearningData>> {
        let rows: Vec<LearningDataRow> = match learning_type {
            Some(lt) => {
                sqlx::query_as(
                    r#"
                    SELECT data_id, agent_id, learning_type, input_data, output_data, features, reward, created_at
                    FROM learning_data
                    WHERE agent_id = ? AND learning_type = ?
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ?
                    "#,
                )
                .bind(&self.agent_id)
                .bind(lt.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT data_id, agent_id, learning_type, input_data, output_data, features, reward, created_at
                    FROM learning_data
                    WHERE agent_id = ?
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ?
                    "#,
                )
                .bind(&self.agent_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_statistics(&self) -> StorageResult<KnowledgeStats> {
        let knowledge_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_entries WHERE agent_id = ?")
                .bind(&self.agent_id)
                .fetch_one(&self.pool)
                .await?;

        let pattern_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pattern_entries WHERE agent_id = ?")
                .bind(&self.agent_id)
                .fetch_one(&self.pool)
                .await?;

        let learning_data_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM learning_data WHERE agent_id = ?")
                .bind(&self.agent_id)
                .fetch_one(&self.pool)
                .await?;

        let cache_size = self.cache.read().await.len();

        Ok(KnowledgeStats {
            agent_id: self.agent_id.clone(),
            knowledge_count: knowledge_count as u64,
            pattern_count: pattern_count as u64,
            learning_data_count: learning_data_count as u64,
            cache_size,
        })
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct KnowledgeRow {
    key: String,
    value: String,
    category: String,
    confidence: f64,
    created_at: String,
    updated_at: String,
}

impl From<KnowledgeRow> for KnowledgeEntry {
    fn from(row: KnowledgeRow) -> Self {
        Self {
            key: row.key,
            value: serde_json::from_str(&row.value).unwrap_or(serde_json::Value::Null),
            category: row.category,
            confidence: row.confidence,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PatternRow {
    pattern_name: String,
    signature: String,
    pattern_data: String,
    frequency: i64,
    first_seen: String,
    last_seen: String,
}

impl From<PatternRow> for PatternEntry {
    fn from(row: PatternRow) -> Self {
        Self {
            pattern_name: row.pattern_name,
            signature: row.signature,
            pattern_data: serde_json::from_str(&row.pattern_data)
                .unwrap_or(serde_json::Value::Null),
            frequency: row.frequency.max(0) as u64,
            first_seen: parse_timestamp(&row.first_seen),
            last_seen: parse_timestamp(&row.last_seen),
        }
    }
}

#[derive(sqlx::FromRow)]
struct LearningDataRow {
    data_id: String,
    agent_id: String,
    learning_type: String,
    input_data: String,
    output_data: String,
    features: String,
    reward: Option<f64>,
    created_at: String,
}

impl From<LearningDataRow> for LearningData {
    fn from(row: LearningDataRow) -> Self {
        Self {
            data_id: DataId(row.data_id),
            agent_id: row.agent_id,
            learning_type: row
                .learning_type
                .parse()
                .unwrap_or(LearningType::Behavioral),
            input_data: serde_json::from_str(&row.input_data).unwrap_or(serde_json::Value::Null),
            output_data: serde_json::from_str(&row.output_data).unwrap_or(serde_json::Value::Null),
            features: serde_json::from_str(&row.features).unwrap_or_default(),
            reward: row.reward,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!(timestamp = s, "Failed to parse timestamp, using current time");
            Utc::now()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_after_cache_clear_keeps_original_created_at() {
        let kb = KnowledgeBase::new_in_memory("agent_test").await.unwrap();
        kb.store_knowledge("k", &json!(1), "general", 1.0)
            .await
            .unwrap();
        let original = kb.get_knowledge_by_category("general").await.unwrap()[0].created_at;

        kb.clear_cache().await;
        kb.store_knowledge("k", &json!(2), "general", 0.5)
            .await
            .unwrap();

        // Cache and DB must agree on the original insertion time
        let cached = kb.cache.read().await.get("k").cloned().unwrap();
        assert_eq!(cached.created_at, original);

        let entries = kb.get_knowledge_by_category("general").await.unwrap();
        assert_eq!(entries[0].created_at, original);
        assert_eq!(entries[0].value, json!(2));
    }

    #[tokio::test]
    async fn cache_refill_never_clobbers_newer_write() {
        let kb = KnowledgeBase::new_in_memory("agent_test").await.unwrap();
        kb.store_knowledge("k", &json!("old"), "general", 1.0)
            .await
            .unwrap();
        kb.clear_cache().await;

        // Replay the losing side of the read-miss race: the DB row is
        // fetched, then a writer commits and caches a newer value before
        // the reader takes the write lock to refill.
        let fetched: Option<KnowledgeRow> = sqlx::query_as(
            r#"
            SELECT key, value, category, confidence, created_at, updated_at
            FROM knowledge_entries
            WHERE agent_id = ? AND key = ?
            "#,
        )
        .bind("agent_test")
        .bind("k")
        .fetch_optional(kb.pool())
        .await
        .unwrap();
        let stale: KnowledgeEntry = fetched.unwrap().into();

        kb.store_knowledge("k", &json!("new"), "general", 1.0)
            .await
            .unwrap();

        kb.cache
            .write()
            .await
            .entry("k".to_string())
            .or_insert(stale);

        assert_eq!(
            kb.retrieve_knowledge("k").await.unwrap(),
            Some(json!("new"))
        );
    }
}
