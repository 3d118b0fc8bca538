//! Learning and adaptation engine for autonomous agents.
//!
//! Each agent gets an [`AgentLearningManager`] that routes reported
//! experiences through four components:
//!
//! - [`knowledge::KnowledgeBase`] - durable keyed facts, pattern frequencies,
//!   and an append-only experience log, backed by SQLite
//! - [`patterns::PatternRecognizer`] - in-memory frequency, sequence, and
//!   temporal pattern mining over observations
//! - [`models::ModelTrainer`] - capability-gated classifier and clusterer
//!   registry that degrades to no-ops when no backend is available
//! - [`rl::QLearningAgent`] - tabular Q-learning with epsilon-greedy action
//!   selection
//!
//! Storage failures propagate as errors; everything else degrades to
//! `false`, `None`, or empty results so a learning hiccup never takes an
//! agent down.
//!
//! # Example
//!
//! ```no_run
//! use agent_learning::config::LearningConfig;
//! use agent_learning::experience::{Experience, LearningType};
//! use agent_learning::manager::AgentLearningManager;
//!
//! # async fn run() -> agent_learning::error::LearningResult<()> {
//! let manager =
//!     AgentLearningManager::with_in_memory("agent_worker", LearningConfig::default()).await?;
//!
//! let experience = Experience::builder(LearningType::Reinforcement)
//!     .transition("idle", "fetch", "busy", vec!["fetch".into(), "wait".into()])
//!     .reward(1.0)
//!     .build()?;
//! manager.learn_from_experience(&experience).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod experience;
pub mod knowledge;
pub mod manager;
pub mod models;
pub mod patterns;
pub mod rl;

pub use config::{AdaptationStrategy, Config, DatabaseConfig, LearningConfig};
pub use error::{LearningError, LearningResult, StorageError, StorageResult};
pub use experience::{Experience, LearningData, LearningType, PerformanceMetrics};
pub use knowledge::{KnowledgeBase, KnowledgeStore};
pub use manager::{AdaptationPlan, AgentLearningManager, Recommendation};
pub use models::ModelTrainer;
pub use patterns::PatternRecognizer;
pub use rl::QLearningAgent;
