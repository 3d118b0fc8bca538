//! Experience records reported by the agent runtime.
//!
//! An [`Experience`] is one completed action outcome, optionally carrying a
//! `(state, action, reward, next_state)` transition for the RL agent.
//! Construction goes through [`ExperienceBuilder`], which validates that the
//! mandatory fields for the declared [`LearningType`] are present instead of
//! probing a loose payload at use sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LearningError, LearningResult};

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a learning-data record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DataId(pub String);

impl DataId {
    /// Create a new unique data ID.
    pub fn new() -> Self {
        Self(format!("data_{}", Uuid::new_v4()))
    }
}

impl Default for DataId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DataId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Learning Type
// ============================================================================

/// Kind of learning an experience feeds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningType {
    /// Labeled input/output pairs.
    Supervised,
    /// Unlabeled feature vectors.
    Unsupervised,
    /// State/action/reward transitions.
    Reinforcement,
    /// Observed behavior without an explicit target.
    Behavioral,
}

impl LearningType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningType::Supervised => "supervised",
            LearningType::Unsupervised => "unsupervised",
            LearningType::Reinforcement => "reinforcement",
            LearningType::Behavioral => "behavioral",
        }
    }
}

impl std::fmt::Display for LearningType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LearningType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "supervised" => Ok(LearningType::Supervised),
            "unsupervised" => Ok(LearningType::Unsupervised),
            "reinforcement" => Ok(LearningType::Reinforcement),
            "behavioral" => Ok(LearningType::Behavioral),
            _ => Err(format!("Unknown learning type: {}", s)),
        }
    }
}

// ============================================================================
// Learning Data
// ============================================================================

/// Append-only experience record persisted in the learning-data log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningData {
    /// Unique record identifier.
    pub data_id: DataId,
    /// Owning agent.
    pub agent_id: String,
    /// Kind of learning this record feeds.
    pub learning_type: LearningType,
    /// Raw input payload.
    pub input_data: serde_json::Value,
    /// Raw output payload.
    pub output_data: serde_json::Value,
    /// Ordered numeric feature vector.
    pub features: Vec<f64>,
    /// Optional scalar reward.
    pub reward: Option<f64>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl LearningData {
    /// Create a new record for an agent.
    pub fn new(
        agent_id: impl Into<String>,
        learning_type: LearningType,
        input_data: serde_json::Value,
        output_data: serde_json::Value,
    ) -> Self {
        Self {
            data_id: DataId::new(),
            agent_id: agent_id.into(),
            learning_type,
            input_data,
            output_data,
            features: Vec::new(),
            reward: None,
            created_at: Utc::now(),
        }
    }

    /// Set the feature vector.
    pub fn with_features(mut self, features: Vec<f64>) -> Self {
        self.features = features;
        self
    }

    /// Set the reward.
    pub fn with_reward(mut self, reward: f64) -> Self {
        self.reward = Some(reward);
        self
    }
}

// ============================================================================
// Experience
// ============================================================================

/// A complete `(state, action, reward, next_state)` transition.
#[derive(Debug, Clone)]
pub struct Transition<'a> {
    /// State the action was taken in.
    pub state: &'a str,
    /// Action taken.
    pub action: &'a str,
    /// Observed reward.
    pub reward: f64,
    /// Resulting state.
    pub next_state: &'a str,
    /// Actions available in the resulting state.
    pub next_actions: &'a [String],
}

/// One reported outcome of an agent action.
///
/// Built through [`Experience::builder`]; invalid combinations are rejected
/// at construction with [`LearningError::InvalidExperience`].
#[derive(Debug, Clone)]
pub struct Experience {
    learning_type: LearningType,
    input_data: serde_json::Value,
    output_data: serde_json::Value,
    features: Vec<f64>,
    reward: Option<f64>,
    state: Option<String>,
    action: Option<String>,
    next_state: Option<String>,
    next_actions: Vec<String>,
    significant: bool,
}

impl Experience {
    /// Start building an experience of the given type.
    pub fn builder(learning_type: LearningType) -> ExperienceBuilder {
        ExperienceBuilder {
            learning_type,
            input_data: serde_json::Value::Null,
            output_data: serde_json::Value::Null,
            features: Vec::new(),
            reward: None,
            state: None,
            action: None,
            next_state: None,
            next_actions: Vec::new(),
            significant: false,
        }
    }

    /// Kind of learning this experience feeds.
    pub fn learning_type(&self) -> LearningType {
        self.learning_type
    }

    /// Raw input payload.
    pub fn input_data(&self) -> &serde_json::Value {
        &self.input_data
    }

    /// Raw output payload.
    pub fn output_data(&self) -> &serde_json::Value {
        &self.output_data
    }

    /// Ordered numeric feature vector.
    pub fn features(&self) -> &[f64] {
        &self.features
    }

    /// Optional scalar reward.
    pub fn reward(&self) -> Option<f64> {
        self.reward
    }

    /// Whether this experience should also be persisted as knowledge.
    pub fn is_significant(&self) -> bool {
        self.significant
    }

    /// The RL transition carried by this experience, if complete.
    pub fn transition(&self) -> Option<Transition<'_>> {
        match (&self.state, &self.action, self.reward, &self.next_state) {
            (Some(state), Some(action), Some(reward), Some(next_state)) => Some(Transition {
                state,
                action,
                reward,
                next_state,
                next_actions: &self.next_actions,
            }),
            _ => None,
        }
    }

    /// Flatten the experience into a single observation payload for pattern
    /// mining. Input and output are nested under stable keys so distinct
    /// payload shapes cannot collide.
    pub fn observation(&self) -> serde_json::Value {
        serde_json::json!({
            "input": self.input_data,
            "output": self.output_data,
        })
    }

    /// Convert into an append-only [`LearningData`] record for an agent.
    pub fn to_learning_data(&self, agent_id: &str) -> LearningData {
        let mut record = LearningData::new(
            agent_id,
            self.learning_type,
            self.input_data.clone(),
            self.output_data.clone(),
        )
        .with_features(self.features.clone());
        record.reward = self.reward;
        record
    }
}

/// Builder for [`Experience`] with construction-time validation.
#[derive(Debug, Clone)]
pub struct ExperienceBuilder {
    learning_type: LearningType,
    input_data: serde_json::Value,
    output_data: serde_json::Value,
    features: Vec<f64>,
    reward: Option<f64>,
    state: Option<String>,
    action: Option<String>,
    next_state: Option<String>,
    next_actions: Vec<String>,
    significant: bool,
}

impl ExperienceBuilder {
    /// Set the input payload.
    pub fn input(mut self, input_data: serde_json::Value) -> Self {
        self.input_data = input_data;
        self
    }

    /// Set the output payload.
    pub fn output(mut self, output_data: serde_json::Value) -> Self {
        self.output_data = output_data;
        self
    }

    /// Set the feature vector.
    pub fn features(mut self, features: Vec<f64>) -> Self {
        self.features = features;
        self
    }

    /// Set the reward.
    pub fn reward(mut self, reward: f64) -> Self {
        self.reward = Some(reward);
        self
    }

    /// Attach an RL transition.
    pub fn transition(
        mut self,
        state: impl Into<String>,
        action: impl Into<String>,
        next_state: impl Into<String>,
        next_actions: Vec<String>,
    ) -> Self {
        self.state = Some(state.into());
        self.action = Some(action.into());
        self.next_state = Some(next_state.into());
        self.next_actions = next_actions;
        self
    }

    /// Mark the experience as significant (also persisted as knowledge).
    pub fn significant(mut self) -> Self {
        self.significant = true;
        self
    }

    /// Validate and build the experience.
    pub fn build(self) -> LearningResult<Experience> {
        match self.learning_type {
            LearningType::Supervised => {
                if self.input_data.is_null() || self.output_data.is_null() {
                    return Err(invalid(
                        "supervised experience requires input_data and output_data",
                    ));
                }
            }
            LearningType::Unsupervised => {
                if self.input_data.is_null() && self.features.is_empty() {
                    return Err(invalid(
                        "unsupervised experience requires input_data or features",
                    ));
                }
            }
            LearningType::Reinforcement => {
                if self.state.is_none() || self.action.is_none() {
                    return Err(invalid(
                        "reinforcement experience requires state and action",
                    ));
                }
                if self.reward.is_none() {
                    return Err(invalid("reinforcement experience requires a reward"));
                }
            }
            LearningType::Behavioral => {
                if self.input_data.is_null() {
                    return Err(invalid("behavioral experience requires input_data"));
                }
            }
        }

        Ok(Experience {
            learning_type: self.learning_type,
            input_data: self.input_data,
            output_data: self.output_data,
            features: self.features,
            reward: self.reward,
            state: self.state,
            action: self.action,
            next_state: self.next_state,
            next_actions: self.next_actions,
            significant: self.significant,
        })
    }
}

fn invalid(message: &str) -> LearningError {
    LearningError::InvalidExperience {
        message: message.to_string(),
    }
}

// ============================================================================
// Performance Metrics
// ============================================================================

/// Point-in-time performance metrics reported by the agent runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Fraction of actions that succeeded (0.0 - 1.0).
    pub success_rate: f64,
    /// Average execution time in seconds.
    pub avg_execution_time: f64,
    /// Fraction of actions that errored (0.0 - 1.0).
    pub error_rate: f64,
}

impl PerformanceMetrics {
    /// Create a metrics snapshot.
    pub fn new(success_rate: f64, avg_execution_time: f64, error_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            avg_execution_time: avg_execution_time.max(0.0),
            error_rate: error_rate.clamp(0.0, 1.0),
        }
    }
}
