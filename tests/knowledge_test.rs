//! Integration tests for the SQLite-backed knowledge base.

use agent_learning::experience::{LearningData, LearningType};
use agent_learning::knowledge::{KnowledgeBase, KnowledgeStore};
use pretty_assertions::assert_eq;
use serde_json::json;

async fn store() -> KnowledgeBase {
    // Per-test log capture; RUST_LOG controls verbosity
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    KnowledgeBase::new_in_memory("agent_test")
        .await
        .expect("in-memory store")
}

#[tokio::test]
async fn knowledge_round_trip() {
    let kb = store().await;
    let value = json!({ "endpoint": "https://api.example.com", "retries": 3 });

    kb.store_knowledge("api_config", &value, "configuration", 0.9)
        .await
        .unwrap();

    let retrieved = kb.retrieve_knowledge("api_config").await.unwrap();
    assert_eq!(retrieved, Some(value));
}

#[tokio::test]
async fn unknown_key_is_none_not_error() {
    let kb = store().await;
    assert_eq!(kb.retrieve_knowledge("missing").await.unwrap(), None);
}

#[tokio::test]
async fn upsert_replaces_without_duplicating() {
    let kb = store().await;

    kb.store_knowledge("k", &json!(1), "numbers", 0.5)
        .await
        .unwrap();
    kb.store_knowledge("k", &json!(2), "numbers", 0.8)
        .await
        .unwrap();

    assert_eq!(kb.retrieve_knowledge("k").await.unwrap(), Some(json!(2)));
    let stats = kb.get_statistics().await.unwrap();
    assert_eq!(stats.knowledge_count, 1);
}

#[tokio::test]
async fn retrieval_survives_cache_clear() {
    let kb = store().await;
    kb.store_knowledge("k", &json!("v"), "general", 1.0)
        .await
        .unwrap();

    kb.clear_cache().await;

    assert_eq!(kb.retrieve_knowledge("k").await.unwrap(), Some(json!("v")));
    // The miss repopulated the cache
    let stats = kb.get_statistics().await.unwrap();
    assert_eq!(stats.cache_size, 1);
}

#[tokio::test]
async fn category_lookup_returns_only_matching_entries() {
    let kb = store().await;
    kb.store_knowledge("a", &json!(1), "metrics", 1.0)
        .await
        .unwrap();
    kb.store_knowledge("b", &json!(2), "metrics", 1.0)
        .await
        .unwrap();
    kb.store_knowledge("c", &json!(3), "other", 1.0)
        .await
        .unwrap();

    let entries = kb.get_knowledge_by_category("metrics").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.category == "metrics"));
}

#[tokio::test]
async fn repeated_pattern_sightings_increment_frequency() {
    let kb = store().await;
    let data = json!({ "action": "retry", "code": 503 });

    for _ in 0..4 {
        kb.store_pattern("error_recovery", &data).await.unwrap();
    }

    let patterns = kb.get_patterns("error_recovery").await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].frequency, 4);
}

#[tokio::test]
async fn equivalent_json_shares_one_pattern_row() {
    let kb = store().await;

    // Same object, different key order
    kb.store_pattern("p", &json!({ "a": 1, "b": 2 }))
        .await
        .unwrap();
    kb.store_pattern("p", &json!({ "b": 2, "a": 1 }))
        .await
        .unwrap();

    let patterns = kb.get_patterns("p").await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].frequency, 2);
}

#[tokio::test]
async fn learning_history_orders_filters_and_limits() {
    let kb = store().await;

    for i in 0..3 {
        let record = LearningData::new(
            "agent_test",
            LearningType::Supervised,
            json!({ "seq": i }),
            json!({}),
        );
        kb.store_learning_data(&record).await.unwrap();
    }
    let rl = LearningData::new(
        "agent_test",
        LearningType::Reinforcement,
        json!({ "seq": 3 }),
        json!({}),
    )
    .with_reward(1.0);
    kb.store_learning_data(&rl).await.unwrap();

    // Newest first
    let all = kb.get_learning_history(None, 10).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].input_data, json!({ "seq": 3 }));

    // Type filter
    let rl_only = kb
        .get_learning_history(Some(LearningType::Reinforcement), 10)
        .await
        .unwrap();
    assert_eq!(rl_only.len(), 1);
    assert_eq!(rl_only[0].reward, Some(1.0));

    // Limit
    let limited = kb.get_learning_history(None, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn statistics_count_all_tables() {
    let kb = store().await;
    kb.store_knowledge("k", &json!(1), "general", 1.0)
        .await
        .unwrap();
    kb.store_pattern("p", &json!({ "x": 1 })).await.unwrap();
    let record = LearningData::new("agent_test", LearningType::Behavioral, json!({}), json!({}));
    kb.store_learning_data(&record).await.unwrap();

    let stats = kb.get_statistics().await.unwrap();
    assert_eq!(stats.agent_id, "agent_test");
    assert_eq!(stats.knowledge_count, 1);
    assert_eq!(stats.pattern_count, 1);
    assert_eq!(stats.learning_data_count, 1);
}

#[tokio::test]
async fn concurrent_reads_never_shadow_the_latest_write() {
    use std::sync::Arc;

    let kb = Arc::new(store().await);
    kb.store_knowledge("counter", &json!(0), "general", 1.0)
        .await
        .unwrap();

    // A reader forcing cache misses while a writer advances the value.
    // Whatever interleaving happens, the last write must win.
    let reader = {
        let kb = kb.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                kb.clear_cache().await;
                let _ = kb.retrieve_knowledge("counter").await;
            }
        })
    };
    let writer = {
        let kb = kb.clone();
        tokio::spawn(async move {
            for i in 1..=100 {
                kb.store_knowledge("counter", &json!(i), "general", 1.0)
                    .await
                    .unwrap();
            }
        })
    };
    writer.await.unwrap();
    reader.await.unwrap();

    assert_eq!(
        kb.retrieve_knowledge("counter").await.unwrap(),
        Some(json!(100))
    );
}

#[tokio::test]
async fn file_backed_store_persists_across_reopen() {
    use agent_learning::config::DatabaseConfig;

    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("knowledge.db"),
        max_connections: 2,
    };

    {
        let kb = KnowledgeBase::new("agent_persist", &config).await.unwrap();
        kb.store_knowledge("k", &json!("durable"), "general", 1.0)
            .await
            .unwrap();
    }

    let reopened = KnowledgeBase::new("agent_persist", &config).await.unwrap();
    assert_eq!(
        reopened.retrieve_knowledge("k").await.unwrap(),
        Some(json!("durable"))
    );
}
