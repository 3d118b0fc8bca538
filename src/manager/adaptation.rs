//! Performance evaluation and adaptation planning.
//!
//! Metrics are judged against thresholds scaled by the configured strategy:
//! aggressive tightens them so adaptation fires sooner, conservative loosens
//! them so it fires later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AdaptationStrategy, AdaptationThresholds};
use crate::experience::PerformanceMetrics;

/// A concrete change the manager should apply to itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdaptationDirective {
    /// Raise epsilon to escape a poorly performing policy.
    IncreaseExploration {
        /// Epsilon before the boost.
        from: f64,
        /// Epsilon after the boost.
        to: f64,
    },
    /// Lower epsilon because current behavior is working.
    DecayExploration {
        /// Multiplicative decay applied to epsilon.
        decay_rate: f64,
        /// Floor epsilon will not drop below.
        min_rate: f64,
    },
    /// Flag a tunable for review without changing it automatically.
    RetuneParameter {
        /// Which tunable tripped.
        parameter: String,
        /// The observation that tripped it.
        reason: String,
    },
}

impl std::fmt::Display for AdaptationDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdaptationDirective::IncreaseExploration { from, to } => {
                write!(f, "increase exploration {:.3} -> {:.3}", from, to)
            }
            AdaptationDirective::DecayExploration { decay_rate, min_rate } => {
                write!(f, "decay exploration by {:.3} (min {:.3})", decay_rate, min_rate)
            }
            AdaptationDirective::RetuneParameter { parameter, reason } => {
                write!(f, "retune {}: {}", parameter, reason)
            }
        }
    }
}

/// Result of evaluating one metrics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationPlan {
    /// Whether performance fell below the effective thresholds.
    pub adaptation_needed: bool,
    /// Directives to apply, possibly empty.
    pub adaptations: Vec<AdaptationDirective>,
    /// Strategy the thresholds were scaled by.
    pub strategy: AdaptationStrategy,
}

/// One historical adaptation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationRecord {
    /// When the decision was made.
    pub recorded_at: DateTime<Utc>,
    /// Whether adaptation was needed.
    pub adaptation_needed: bool,
    /// How many directives the plan carried.
    pub directive_count: usize,
}

/// Where a recommendation's score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Observed frequently in the pattern recognizer.
    FrequentPattern,
    /// High learned value in the Q-table.
    PolicyValue,
}

/// A suggestion derived from accumulated learning state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// What produced the suggestion.
    pub source: RecommendationSource,
    /// Pattern signature or action name.
    pub subject: String,
    /// Frequency or Q-value; higher is stronger.
    pub score: f64,
}

/// Evaluate metrics against strategy-scaled thresholds and plan directives.
///
/// `current_exploration` is the agent's epsilon at evaluation time, used to
/// compute the boosted value the plan proposes.
pub fn evaluate(
    metrics: &PerformanceMetrics,
    strategy: AdaptationStrategy,
    thresholds: &AdaptationThresholds,
    current_exploration: f64,
) -> AdaptationPlan {
    let sensitivity = strategy.sensitivity();

    // A lower sensitivity tightens the bar: aggressive demands a success
    // rate closer to 1.0 and tolerates less error.
    let effective_min_success = 1.0 - (1.0 - thresholds.min_success_rate) * sensitivity;
    let effective_max_error = thresholds.max_error_rate * sensitivity;
    let effective_max_time = thresholds.max_execution_time * sensitivity;

    let mut adaptations = Vec::new();
    let mut adaptation_needed = false;

    if metrics.success_rate < effective_min_success || metrics.error_rate > effective_max_error {
        adaptation_needed = true;
        let boosted = (current_exploration + thresholds.exploration_boost)
            .min(thresholds.max_exploration_rate);
        adaptations.push(AdaptationDirective::IncreaseExploration {
            from: current_exploration,
            to: boosted,
        });
        if metrics.error_rate > effective_max_error {
            adaptations.push(AdaptationDirective::RetuneParameter {
                parameter: "error_handling".to_string(),
                reason: format!(
                    "error rate {:.3} above threshold {:.3}",
                    metrics.error_rate, effective_max_error
                ),
            });
        }
    }

    if metrics.avg_execution_time > effective_max_time {
        adaptation_needed = true;
        adaptations.push(AdaptationDirective::RetuneParameter {
            parameter: "execution_time".to_string(),
            reason: format!(
                "average execution time {:.3}s above threshold {:.3}s",
                metrics.avg_execution_time, effective_max_time
            ),
        });
    }

    // Strong performance earns an exploration decay, not an adaptation.
    if !adaptation_needed
        && metrics.success_rate >= thresholds.strong_success_rate
        && metrics.error_rate <= thresholds.max_error_rate / 2.0
    {
        adaptations.push(AdaptationDirective::DecayExploration {
            decay_rate: thresholds.exploration_decay,
            min_rate: thresholds.min_exploration_rate,
        });
    }

    AdaptationPlan {
        adaptation_needed,
        adaptations,
        strategy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn metrics(success_rate: f64, avg_execution_time: f64, error_rate: f64) -> PerformanceMetrics {
        PerformanceMetrics::new(success_rate, avg_execution_time, error_rate)
    }

    #[test]
    fn healthy_metrics_need_no_adaptation() {
        let plan = evaluate(
            &metrics(0.95, 1.2, 0.02),
            AdaptationStrategy::Gradual,
            &AdaptationThresholds::default(),
            0.1,
        );
        assert!(!plan.adaptation_needed);
        assert_eq!(
            plan.adaptations,
            vec![AdaptationDirective::DecayExploration {
                decay_rate: 0.95,
                min_rate: 0.01,
            }]
        );
    }

    #[test]
    fn poor_metrics_trigger_exploration_boost() {
        let plan = evaluate(
            &metrics(0.3, 10.0, 0.4),
            AdaptationStrategy::Gradual,
            &AdaptationThresholds::default(),
            0.1,
        );
        assert!(plan.adaptation_needed);
        assert!(plan.adaptations.iter().any(|d| matches!(
            d,
            AdaptationDirective::IncreaseExploration { from, to }
                if (*from - 0.1).abs() < 1e-12 && (*to - 0.15).abs() < 1e-12
        )));
        assert!(plan
            .adaptations
            .iter()
            .any(|d| matches!(d, AdaptationDirective::RetuneParameter { parameter, .. } if parameter == "execution_time")));
    }

    #[test]
    fn aggressive_strategy_tightens_thresholds() {
        // 0.75 success passes the gradual bar (0.7) but fails the
        // aggressive bar (1 - 0.3 * 0.5 = 0.85).
        let m = metrics(0.75, 1.0, 0.0);
        let thresholds = AdaptationThresholds::default();

        let gradual = evaluate(&m, AdaptationStrategy::Gradual, &thresholds, 0.1);
        assert!(!gradual.adaptation_needed);

        let aggressive = evaluate(&m, AdaptationStrategy::Aggressive, &thresholds, 0.1);
        assert!(aggressive.adaptation_needed);
    }

    #[test]
    fn conservative_strategy_loosens_thresholds() {
        // 0.6 success fails the gradual bar but passes conservative
        // (1 - 0.3 * 1.5 = 0.55).
        let m = metrics(0.6, 1.0, 0.0);
        let thresholds = AdaptationThresholds::default();

        let gradual = evaluate(&m, AdaptationStrategy::Gradual, &thresholds, 0.1);
        assert!(gradual.adaptation_needed);

        let conservative = evaluate(&m, AdaptationStrategy::Conservative, &thresholds, 0.1);
        assert!(!conservative.adaptation_needed);
    }

    #[test]
    fn exploration_boost_respects_cap() {
        let plan = evaluate(
            &metrics(0.1, 1.0, 0.0),
            AdaptationStrategy::Gradual,
            &AdaptationThresholds::default(),
            0.48,
        );
        assert!(plan.adaptations.iter().any(|d| matches!(
            d,
            AdaptationDirective::IncreaseExploration { to, .. } if (*to - 0.5).abs() < 1e-12
        )));
    }

    #[test]
    fn middling_metrics_earn_neither_boost_nor_decay() {
        // Above the failure bar but below the strong bar
        let plan = evaluate(
            &metrics(0.8, 1.0, 0.08),
            AdaptationStrategy::Gradual,
            &AdaptationThresholds::default(),
            0.1,
        );
        assert!(!plan.adaptation_needed);
        assert!(plan.adaptations.is_empty());
    }
}
