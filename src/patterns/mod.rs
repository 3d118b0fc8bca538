//! In-memory pattern mining over a stream of observations.
//!
//! The recognizer keeps three views of the stream: a frequency counter keyed
//! by canonical signature, a bounded ordered sequence of recent signatures,
//! and coarse hour-of-day temporal buckets. Counting is O(1) amortized per
//! observation; the frequency threshold trades recall for noise suppression.
//!
//! Nothing here persists on its own. Durable pattern storage flows through
//! the knowledge base when the manager decides an observation matters.

mod signature;

pub use signature::canonical_signature;

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

/// A signature whose recurrence count reached the frequency threshold.
#[derive(Debug, Clone, Serialize)]
pub struct FrequentPattern {
    /// Canonical signature of the observation.
    pub signature: String,
    /// Number of times it has been observed.
    pub frequency: u64,
}

/// Distribution of observations over hour-of-day buckets.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalPatterns {
    /// Observation count per hour of day (0-23); absent hours were never hit.
    pub buckets: HashMap<u32, u64>,
    /// Total observations seen.
    pub observation_count: u64,
    /// Number of distinct hours with at least one observation.
    pub bucket_count: usize,
    /// Busiest hour, if any observations exist.
    pub peak_hour: Option<u32>,
}

/// Summary statistics about the recognizer's state.
#[derive(Debug, Clone, Serialize)]
pub struct PatternStats {
    /// Owning agent.
    pub agent_id: String,
    /// Distinct signatures seen.
    pub total_patterns: usize,
    /// Signatures at or above the frequency threshold.
    pub frequent_patterns: usize,
    /// Highest recurrence count.
    pub max_frequency: u64,
    /// Mean recurrence count across distinct signatures.
    pub average_frequency: f64,
}

#[derive(Default)]
struct RecognizerState {
    frequency: HashMap<String, u64>,
    sequence: VecDeque<String>,
    temporal: HashMap<u32, u64>,
    observation_count: u64,
}

/// Per-agent in-memory frequency and temporal pattern miner.
pub struct PatternRecognizer {
    agent_id: String,
    frequency_threshold: u64,
    sequence_window: usize,
    state: RwLock<RecognizerState>,
}

impl PatternRecognizer {
    /// Create a recognizer for one agent.
    pub fn new(agent_id: impl Into<String>, frequency_threshold: u64, sequence_window: usize) -> Self {
        Self {
            agent_id: agent_id.into(),
            frequency_threshold: frequency_threshold.max(1),
            sequence_window: sequence_window.max(2),
            state: RwLock::new(RecognizerState::default()),
        }
    }

    /// Record one observation.
    ///
    /// Increments the signature's frequency counter, appends to the bounded
    /// sequence list, and bumps the hour-of-day bucket for `timestamp`
    /// (defaulting to now).
    pub async fn add_observation(
        &self,
        observation: &serde_json::Value,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let signature = canonical_signature(observation);
        let hour = timestamp.unwrap_or_else(Utc::now).hour();

        let mut state = self.state.write().await;

        let count = state.frequency.entry(signature.clone()).or_insert(0);
        *count += 1;
        let count = *count;

        state.sequence.push_back(signature.clone());
        while state.sequence.len() > self.sequence_window {
            state.sequence.pop_front();
        }

        *state.temporal.entry(hour).or_insert(0) += 1;
        state.observation_count += 1;

        debug!(
            agent_id = %self.agent_id,
            frequency = count,
            hour,
            "Observation recorded"
        );
    }

    /// Signatures whose counter reached `min_frequency` (defaults to the
    /// configured threshold), most frequent first.
    pub async fn get_frequent_patterns(&self, min_frequency: Option<u64>) -> Vec<FrequentPattern> {
        let threshold = min_frequency.unwrap_or(self.frequency_threshold);
        let state = self.state.read().await;

        let mut patterns: Vec<FrequentPattern> = state
            .frequency
            .iter()
            .filter(|(_, &count)| count >= threshold)
            .map(|(signature, &frequency)| FrequentPattern {
                signature: signature.clone(),
                frequency,
            })
            .collect();

        patterns.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        patterns
    }

    /// Recurrence count for one signature, 0 if never seen.
    pub async fn frequency_of(&self, signature: &str) -> u64 {
        let state = self.state.read().await;
        state.frequency.get(signature).copied().unwrap_or(0)
    }

    /// Adjacent-pair counts over the most recent `window` observations.
    ///
    /// Pairs are rendered as `"a -> b"` signatures, most frequent first.
    pub async fn get_sequence_patterns(&self, window: usize) -> Vec<FrequentPattern> {
        let state = self.state.read().await;

        let recent: Vec<&String> = state
            .sequence
            .iter()
            .rev()
            .take(window.max(2))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let mut counts: HashMap<String, u64> = HashMap::new();
        for pair in recent.windows(2) {
            let key = format!("{} -> {}", pair[0], pair[1]);
            *counts.entry(key).or_insert(0) += 1;
        }

        let mut patterns: Vec<FrequentPattern> = counts
            .into_iter()
            .map(|(signature, frequency)| FrequentPattern { signature, frequency })
            .collect();
        patterns.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        patterns
    }

    /// Hour-of-day distribution and stream-level counts.
    pub async fn get_temporal_patterns(&self) -> TemporalPatterns {
        let state = self.state.read().await;

        let peak_hour = state
            .temporal
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(hour, _)| *hour);

        TemporalPatterns {
            buckets: state.temporal.clone(),
            observation_count: state.observation_count,
            bucket_count: state.temporal.len(),
            peak_hour,
        }
    }

    /// Summary statistics; all fields are zero-safe on an empty stream.
    pub async fn get_pattern_statistics(&self) -> PatternStats {
        let state = self.state.read().await;

        let total_patterns = state.frequency.len();
        let frequent_patterns = state
            .frequency
            .values()
            .filter(|&&count| count >= self.frequency_threshold)
            .count();
        let max_frequency = state.frequency.values().copied().max().unwrap_or(0);
        let average_frequency = if total_patterns > 0 {
            state.frequency.values().sum::<u64>() as f64 / total_patterns as f64
        } else {
            0.0
        };

        PatternStats {
            agent_id: self.agent_id.clone(),
            total_patterns,
            frequent_patterns,
            max_frequency,
            average_frequency,
        }
    }
}
