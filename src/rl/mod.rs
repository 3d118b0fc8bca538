//! Tabular Q-learning with epsilon-greedy action selection.
//!
//! The agent keeps a (state, action) value table and a bounded ring buffer
//! of the most recent transitions. All mutation goes through a single
//! `RwLock` so concurrent callers see consistent statistics.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::LearningConfig;

/// One recorded transition, kept in the bounded replay buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceTuple {
    /// State the action was taken in.
    pub state: String,
    /// Action taken.
    pub action: String,
    /// Reward received.
    pub reward: f64,
    /// State the transition landed in.
    pub next_state: String,
    /// When the transition was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Counters and aggregates for stats reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlStats {
    /// Number of (state, action) entries in the value table.
    pub q_table_size: usize,
    /// Current replay buffer occupancy.
    pub experience_buffer_size: usize,
    /// Transitions processed since creation or last reset.
    pub total_episodes: u64,
    /// Mean reward over the current buffer contents, 0.0 when empty.
    pub average_reward: f64,
    /// Actions chosen by random exploration.
    pub exploration_count: u64,
    /// Actions chosen greedily from the table.
    pub exploitation_count: u64,
    /// Current epsilon.
    pub exploration_rate: f64,
}

struct AgentState {
    q_table: HashMap<(String, String), f64>,
    buffer: VecDeque<ExperienceTuple>,
    total_episodes: u64,
    exploration_count: u64,
    exploitation_count: u64,
    exploration_rate: f64,
}

/// Tabular Q-learning agent.
pub struct QLearningAgent {
    learning_rate: f64,
    discount_factor: f64,
    buffer_capacity: usize,
    state: RwLock<AgentState>,
}

impl QLearningAgent {
    /// Build an agent from the learning configuration.
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            discount_factor: config.discount_factor,
            buffer_capacity: config.experience_buffer_size,
            state: RwLock::new(AgentState {
                q_table: HashMap::new(),
                buffer: VecDeque::with_capacity(config.experience_buffer_size.min(1024)),
                total_episodes: 0,
                exploration_count: 0,
                exploitation_count: 0,
                exploration_rate: config.exploration_rate,
            }),
        }
    }

    /// Pick an action for `state` with epsilon-greedy selection.
    ///
    /// With probability epsilon a uniformly random action is returned;
    /// otherwise the action with the highest Q-value wins, ties broken by
    /// the order actions were supplied in. None when `actions` is empty.
    pub async fn get_action(&self, state: &str, actions: &[String]) -> Option<String> {
        if actions.is_empty() {
            return None;
        }

        let mut guard = self.state.write().await;
        let explore = rand::thread_rng().gen::<f64>() < guard.exploration_rate;

        let chosen = if explore {
            guard.exploration_count += 1;
            actions
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_else(|| actions[0].clone())
        } else {
            guard.exploitation_count += 1;
            let mut best = &actions[0];
            let mut best_value = guard
                .q_table
                .get(&(state.to_string(), actions[0].clone()))
                .copied()
                .unwrap_or(0.0);
            for action in &actions[1..] {
                let value = guard
                    .q_table
                    .get(&(state.to_string(), action.clone()))
                    .copied()
                    .unwrap_or(0.0);
                if value > best_value {
                    best = action;
                    best_value = value;
                }
            }
            best.clone()
        };

        debug!(state, action = %chosen, explored = explore, "Action selected");
        Some(chosen)
    }

    /// Apply one temporal-difference update and record the transition.
    ///
    /// `Q(s,a) += alpha * (r + gamma * max_a' Q(s',a') - Q(s,a))`, with the
    /// bootstrap term taken as 0.0 when `next_actions` is empty (terminal).
    pub async fn update_q_value(
        &self,
        state: &str,
        action: &str,
        reward: f64,
        next_state: &str,
        next_actions: &[String],
    ) {
        let mut guard = self.state.write().await;

        let max_next = next_actions
            .iter()
            .map(|a| {
                guard
                    .q_table
                    .get(&(next_state.to_string(), a.clone()))
                    .copied()
                    .unwrap_or(0.0)
            })
            .fold(f64::NEG_INFINITY, f64::max);
        let max_next = if max_next.is_finite() { max_next } else { 0.0 };

        let key = (state.to_string(), action.to_string());
        let current = guard.q_table.get(&key).copied().unwrap_or(0.0);
        let updated =
            current + self.learning_rate * (reward + self.discount_factor * max_next - current);
        guard.q_table.insert(key, updated);

        if guard.buffer.len() >= self.buffer_capacity {
            guard.buffer.pop_front();
        }
        guard.buffer.push_back(ExperienceTuple {
            state: state.to_string(),
            action: action.to_string(),
            reward,
            next_state: next_state.to_string(),
            recorded_at: Utc::now(),
        });
        guard.total_episodes += 1;

        debug!(state, action, reward, q_value = updated, "Q-value updated");
    }

    /// Learned value for a (state, action) pair, 0.0 when unseen.
    pub async fn get_q_value(&self, state: &str, action: &str) -> f64 {
        self.state
            .read()
            .await
            .q_table
            .get(&(state.to_string(), action.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    /// All learned action values for a state.
    pub async fn get_state_values(&self, state: &str) -> HashMap<String, f64> {
        self.state
            .read()
            .await
            .q_table
            .iter()
            .filter(|((s, _), _)| s == state)
            .map(|((_, a), v)| (a.clone(), *v))
            .collect()
    }

    /// Multiply epsilon by `decay`, never dropping below `min_rate`.
    pub async fn decay_exploration(&self, decay: f64, min_rate: f64) {
        let mut guard = self.state.write().await;
        guard.exploration_rate = (guard.exploration_rate * decay).max(min_rate);
    }

    /// Add `amount` to epsilon, capped at `max_rate`.
    pub async fn boost_exploration(&self, amount: f64, max_rate: f64) {
        let mut guard = self.state.write().await;
        guard.exploration_rate = (guard.exploration_rate + amount).min(max_rate);
    }

    /// Current epsilon.
    pub async fn exploration_rate(&self) -> f64 {
        self.state.read().await.exploration_rate
    }

    /// Zero the episode and selection counters, keeping learned values.
    pub async fn reset_statistics(&self) {
        let mut guard = self.state.write().await;
        guard.total_episodes = 0;
        guard.exploration_count = 0;
        guard.exploitation_count = 0;
    }

    /// Counters and aggregates for stats reporting.
    pub async fn get_learning_statistics(&self) -> RlStats {
        let guard = self.state.read().await;
        let average_reward = if guard.buffer.is_empty() {
            0.0
        } else {
            guard.buffer.iter().map(|t| t.reward).sum::<f64>() / guard.buffer.len() as f64
        };
        RlStats {
            q_table_size: guard.q_table.len(),
            experience_buffer_size: guard.buffer.len(),
            total_episodes: guard.total_episodes,
            average_reward,
            exploration_count: guard.exploration_count,
            exploitation_count: guard.exploitation_count,
            exploration_rate: guard.exploration_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn agent_with(exploration_rate: f64) -> QLearningAgent {
        let config = LearningConfig {
            exploration_rate,
            ..LearningConfig::default()
        };
        QLearningAgent::new(&config)
    }

    #[tokio::test]
    async fn td_update_matches_hand_computation() {
        let agent = agent_with(0.1);
        // alpha = 0.1, gamma = 0.9, everything starts at 0
        agent
            .update_q_value("s0", "a1", 1.0, "s1", &["a1".to_string()])
            .await;
        // 0 + 0.1 * (1.0 + 0.9 * 0 - 0) = 0.1
        assert!((agent.get_q_value("s0", "a1").await - 0.1).abs() < 1e-12);

        agent
            .update_q_value("s1", "a1", 0.5, "s0", &["a1".to_string()])
            .await;
        // bootstrap now sees Q(s0,a1) = 0.1
        let expected = 0.1 * (0.5 + 0.9 * 0.1);
        assert!((agent.get_q_value("s1", "a1").await - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn terminal_update_bootstraps_zero() {
        let agent = agent_with(0.1);
        agent.update_q_value("s0", "stop", 2.0, "done", &[]).await;
        assert!((agent.get_q_value("s0", "stop").await - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn greedy_selection_prefers_learned_action() {
        let agent = agent_with(0.0); // never explore
        let actions = vec!["left".to_string(), "right".to_string()];

        for _ in 0..20 {
            agent.update_q_value("s", "right", 1.0, "s", &actions).await;
        }

        for _ in 0..10 {
            assert_eq!(agent.get_action("s", &actions).await.as_deref(), Some("right"));
        }

        let stats = agent.get_learning_statistics().await;
        assert_eq!(stats.exploitation_count, 10);
        assert_eq!(stats.exploration_count, 0);
    }

    #[tokio::test]
    async fn ties_resolve_in_supplied_order() {
        let agent = agent_with(0.0);
        let actions = vec!["first".to_string(), "second".to_string()];
        assert_eq!(agent.get_action("fresh", &actions).await.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn empty_action_set_yields_none() {
        let agent = agent_with(0.5);
        assert_eq!(agent.get_action("s", &[]).await, None);
    }

    #[tokio::test]
    async fn buffer_is_bounded() {
        let config = LearningConfig {
            experience_buffer_size: 3,
            ..LearningConfig::default()
        };
        let agent = QLearningAgent::new(&config);

        for i in 0..5 {
            agent
                .update_q_value("s", "a", i as f64, "s", &["a".to_string()])
                .await;
        }

        let stats = agent.get_learning_statistics().await;
        assert_eq!(stats.experience_buffer_size, 3);
        assert_eq!(stats.total_episodes, 5);
        // Oldest rewards (0, 1) were evicted
        assert!((stats.average_reward - 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn exploration_decay_and_boost_respect_bounds() {
        let agent = agent_with(0.2);

        agent.decay_exploration(0.5, 0.15).await;
        assert!((agent.exploration_rate().await - 0.15).abs() < 1e-12);

        agent.boost_exploration(1.0, 0.5).await;
        assert!((agent.exploration_rate().await - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn reset_clears_counters_but_not_values() {
        let agent = agent_with(0.0);
        agent
            .update_q_value("s", "a", 1.0, "s", &["a".to_string()])
            .await;
        agent.get_action("s", &["a".to_string()]).await;

        agent.reset_statistics().await;
        let stats = agent.get_learning_statistics().await;
        assert_eq!(stats.total_episodes, 0);
        assert_eq!(stats.exploitation_count, 0);
        assert!(agent.get_q_value("s", "a").await > 0.0);
    }

    #[tokio::test]
    async fn repeated_updates_converge_toward_return() {
        let agent = agent_with(0.0);
        // Constant reward 1.0 in a self-loop converges to 1 / (1 - gamma) = 10
        let actions = vec!["a".to_string()];
        for _ in 0..2000 {
            agent.update_q_value("s", "a", 1.0, "s", &actions).await;
        }
        let q = agent.get_q_value("s", "a").await;
        assert!((q - 10.0).abs() < 0.1, "q = {}", q);
    }
}
