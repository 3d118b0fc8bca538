//! Learning manager facade.
//!
//! [`AgentLearningManager`] owns one of each learning component for a single
//! agent and routes experiences, metrics, and queries between them, so
//! callers see one surface instead of four.

mod adaptation;

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{AdaptationStrategy, DatabaseConfig, LearningConfig};
use crate::error::LearningResult;
use crate::experience::{Experience, PerformanceMetrics};
use crate::knowledge::{KnowledgeBase, KnowledgeStats, KnowledgeStore};
use crate::models::{ModelTrainer, TrainerStats};
use crate::patterns::{canonical_signature, PatternRecognizer, PatternStats};
use crate::rl::{QLearningAgent, RlStats};

pub use adaptation::{
    AdaptationDirective, AdaptationPlan, AdaptationRecord, Recommendation, RecommendationSource,
};

const ADAPTATION_HISTORY_LIMIT: usize = 100;

/// Combined snapshot of every learning component.
#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveStats {
    /// Owning agent.
    pub agent_id: String,
    /// Whether learn_from_experience currently stores anything.
    pub learning_enabled: bool,
    /// Strategy used when evaluating metrics.
    pub adaptation_strategy: AdaptationStrategy,
    /// Durable store counters.
    pub knowledge_base: KnowledgeStats,
    /// In-memory pattern miner counters.
    pub pattern_recognizer: PatternStats,
    /// Model registry counters.
    pub model_trainer: TrainerStats,
    /// Q-learning counters.
    pub rl_agent: RlStats,
    /// Adaptation decisions retained in history.
    pub adaptation_count: usize,
}

/// Facade over knowledge storage, pattern mining, model training, and
/// reinforcement learning for one agent.
pub struct AgentLearningManager {
    agent_id: String,
    config: LearningConfig,
    knowledge: Arc<dyn KnowledgeStore>,
    patterns: PatternRecognizer,
    models: ModelTrainer,
    rl: QLearningAgent,
    history: RwLock<VecDeque<AdaptationRecord>>,
}

impl AgentLearningManager {
    /// Create a manager over an existing knowledge store.
    ///
    /// Fails with [`LearningError::Config`](crate::error::LearningError::Config)
    /// when the configuration is out of range.
    pub fn new(
        agent_id: impl Into<String>,
        config: LearningConfig,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> LearningResult<Self> {
        let config = config.validated()?;
        let agent_id = agent_id.into();

        let patterns = PatternRecognizer::new(
            agent_id.clone(),
            config.frequency_threshold,
            config.sequence_window,
        );
        let models = ModelTrainer::with_default_backend();
        let rl = QLearningAgent::new(&config);

        info!(
            agent_id = %agent_id,
            strategy = %config.adaptation_strategy,
            learning_enabled = config.learning_enabled,
            "Learning manager created"
        );

        Ok(Self {
            agent_id,
            config,
            knowledge,
            patterns,
            models,
            rl,
            history: RwLock::new(VecDeque::new()),
        })
    }

    /// Create a manager backed by a file-based SQLite knowledge base.
    pub async fn with_sqlite(
        agent_id: impl Into<String>,
        config: LearningConfig,
        database: &DatabaseConfig,
    ) -> LearningResult<Self> {
        let agent_id = agent_id.into();
        let knowledge = KnowledgeBase::new(agent_id.clone(), database).await?;
        Self::new(agent_id, config, Arc::new(knowledge))
    }

    /// Create a manager backed by an in-memory knowledge base.
    pub async fn with_in_memory(
        agent_id: impl Into<String>,
        config: LearningConfig,
    ) -> LearningResult<Self> {
        let agent_id = agent_id.into();
        let knowledge = KnowledgeBase::new_in_memory(agent_id.clone()).await?;
        Self::new(agent_id, config, Arc::new(knowledge))
    }

    /// Owning agent.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The model trainer, for callers that fit or query models directly.
    pub fn models(&self) -> &ModelTrainer {
        &self.models
    }

    /// The knowledge store this manager writes to.
    pub fn knowledge(&self) -> &Arc<dyn KnowledgeStore> {
        &self.knowledge
    }

    /// The reinforcement learning agent.
    pub fn rl(&self) -> &QLearningAgent {
        &self.rl
    }

    /// The pattern recognizer.
    pub fn patterns(&self) -> &PatternRecognizer {
        &self.patterns
    }

    /// Ingest one experience across every component.
    ///
    /// Appends it to the learning history, feeds the pattern miner, persists
    /// significant experiences as knowledge, and applies any carried RL
    /// transition. Returns `Ok(false)` without side effects when learning is
    /// disabled; storage failures propagate.
    pub async fn learn_from_experience(&self, experience: &Experience) -> LearningResult<bool> {
        if !self.config.learning_enabled {
            debug!(agent_id = %self.agent_id, "Learning disabled, experience ignored");
            return Ok(false);
        }

        let record = experience.to_learning_data(&self.agent_id);
        self.knowledge.store_learning_data(&record).await?;

        self.patterns
            .add_observation(&experience.observation(), None)
            .await;

        if experience.is_significant() {
            let key = format!("significant_{}", record.data_id);
            self.knowledge
                .store_knowledge(&key, &experience.observation(), "experience", 1.0)
                .await?;
        }

        if let Some(t) = experience.transition() {
            self.rl
                .update_q_value(t.state, t.action, t.reward, t.next_state, t.next_actions)
                .await;
        }

        debug!(
            agent_id = %self.agent_id,
            learning_type = %experience.learning_type(),
            significant = experience.is_significant(),
            "Experience learned"
        );
        Ok(true)
    }

    /// Evaluate metrics, apply the resulting directives to the RL agent,
    /// and record the decision in the bounded adaptation history.
    pub async fn adapt_behavior(&self, metrics: &PerformanceMetrics) -> AdaptationPlan {
        let current = self.rl.exploration_rate().await;
        let plan = adaptation::evaluate(
            metrics,
            self.config.adaptation_strategy,
            &self.config.thresholds,
            current,
        );

        for directive in &plan.adaptations {
            match directive {
                AdaptationDirective::IncreaseExploration { to, .. } => {
                    self.rl
                        .boost_exploration(
                            to - current,
                            self.config.thresholds.max_exploration_rate,
                        )
                        .await;
                }
                AdaptationDirective::DecayExploration { decay_rate, min_rate } => {
                    self.rl.decay_exploration(*decay_rate, *min_rate).await;
                }
                AdaptationDirective::RetuneParameter { .. } => {}
            }
        }

        let record = AdaptationRecord {
            recorded_at: chrono::Utc::now(),
            adaptation_needed: plan.adaptation_needed,
            directive_count: plan.adaptations.len(),
        };
        let mut history = self.history.write().await;
        if history.len() >= ADAPTATION_HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(record);

        info!(
            agent_id = %self.agent_id,
            adaptation_needed = plan.adaptation_needed,
            directives = plan.adaptations.len(),
            success_rate = metrics.success_rate,
            error_rate = metrics.error_rate,
            "Behavior adaptation evaluated"
        );
        plan
    }

    /// Recent adaptation decisions, oldest first.
    pub async fn adaptation_history(&self) -> Vec<AdaptationRecord> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Suggestions derived from mined patterns and learned policy values.
    ///
    /// When the context itself matches a frequent pattern it is included;
    /// when the context carries a `"state"` string, every learned action
    /// value for that state contributes. Sorted by score descending; empty
    /// when nothing has been learned yet.
    pub async fn get_recommendations(&self, context: &Value) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        let signature = canonical_signature(context);
        for pattern in self.patterns.get_frequent_patterns(None).await {
            if pattern.signature == signature {
                recommendations.push(Recommendation {
                    source: RecommendationSource::FrequentPattern,
                    subject: pattern.signature,
                    score: pattern.frequency as f64,
                });
            }
        }

        if let Some(state) = context.get("state").and_then(Value::as_str) {
            for (action, value) in self.rl.get_state_values(state).await {
                recommendations.push(Recommendation {
                    source: RecommendationSource::PolicyValue,
                    subject: action,
                    score: value,
                });
            }
        }

        recommendations.sort_by(|a, b| b.score.total_cmp(&a.score));
        recommendations
    }

    /// Snapshot of every component's counters.
    pub async fn get_comprehensive_stats(&self) -> LearningResult<ComprehensiveStats> {
        let knowledge_base = self.knowledge.get_statistics().await?;
        Ok(ComprehensiveStats {
            agent_id: self.agent_id.clone(),
            learning_enabled: self.config.learning_enabled,
            adaptation_strategy: self.config.adaptation_strategy,
            knowledge_base,
            pattern_recognizer: self.patterns.get_pattern_statistics().await,
            model_trainer: self.models.statistics().await,
            rl_agent: self.rl.get_learning_statistics().await,
            adaptation_count: self.history.read().await.len(),
        })
    }
}
