use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LearningError, LearningResult};

/// Engine configuration loaded from environment variables or built explicitly
#[derive(Debug, Clone)]
pub struct Config {
    /// Learning behavior parameters.
    pub learning: LearningConfig,
    /// Durable store settings.
    pub database: DatabaseConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

/// How aggressively performance deviations trigger adaptation.
///
/// Strategy changes sensitivity, not direction: an aggressive manager reacts
/// to smaller deviations than a conservative one; gradual is the default
/// middle ground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptationStrategy {
    /// Middle-ground sensitivity.
    #[default]
    Gradual,
    /// Reacts to smaller deviations.
    Aggressive,
    /// Tolerates larger deviations before reacting.
    Conservative,
}

impl AdaptationStrategy {
    /// Multiplier applied to the tolerated deviation from base thresholds.
    /// Below 1.0 tightens thresholds, above 1.0 loosens them.
    pub fn sensitivity(&self) -> f64 {
        match self {
            AdaptationStrategy::Aggressive => 0.5,
            AdaptationStrategy::Gradual => 1.0,
            AdaptationStrategy::Conservative => 1.5,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationStrategy::Gradual => "gradual",
            AdaptationStrategy::Aggressive => "aggressive",
            AdaptationStrategy::Conservative => "conservative",
        }
    }
}

impl std::fmt::Display for AdaptationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AdaptationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gradual" => Ok(AdaptationStrategy::Gradual),
            "aggressive" => Ok(AdaptationStrategy::Aggressive),
            "conservative" => Ok(AdaptationStrategy::Conservative),
            _ => Err(format!("Unknown adaptation strategy: {}", s)),
        }
    }
}

/// Base thresholds for performance evaluation.
///
/// These are tunable configuration, not hard-coded cutoffs. The active
/// [`AdaptationStrategy`] scales the tolerated deviation around them.
#[derive(Debug, Clone)]
pub struct AdaptationThresholds {
    /// Minimum acceptable success rate (0.0 - 1.0).
    pub min_success_rate: f64,
    /// Maximum acceptable error rate (0.0 - 1.0).
    pub max_error_rate: f64,
    /// Maximum acceptable average execution time (seconds).
    pub max_execution_time: f64,
    /// Success rate above which exploitation is favored.
    pub strong_success_rate: f64,
    /// Exploration rate increment applied on poor performance.
    pub exploration_boost: f64,
    /// Exploration ceiling when boosting.
    pub max_exploration_rate: f64,
    /// Decay factor suggested on strong performance.
    pub exploration_decay: f64,
    /// Exploration floor when decaying.
    pub min_exploration_rate: f64,
}

impl Default for AdaptationThresholds {
    fn default() -> Self {
        Self {
            min_success_rate: 0.7,
            max_error_rate: 0.1,
            max_execution_time: 5.0,
            strong_success_rate: 0.9,
            exploration_boost: 0.05,
            max_exploration_rate: 0.5,
            exploration_decay: 0.95,
            min_exploration_rate: 0.01,
        }
    }
}

/// Learning behavior configuration for one agent
#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// Q-learning step size (alpha), in (0, 1].
    pub learning_rate: f64,
    /// Future-reward discount (gamma), in (0, 1].
    pub discount_factor: f64,
    /// Initial epsilon-greedy exploration rate, in (0, 1].
    pub exploration_rate: f64,
    /// Sensitivity profile for behavior adaptation.
    pub adaptation_strategy: AdaptationStrategy,
    /// Master switch; when false, `learn_from_experience` is a no-op.
    pub learning_enabled: bool,
    /// Minimum recurrences before a pattern counts as frequent.
    pub frequency_threshold: u64,
    /// Capacity of the RL experience ring buffer.
    pub experience_buffer_size: usize,
    /// Number of recent observations kept for sequence mining.
    pub sequence_window: usize,
    /// Performance thresholds for `adapt_behavior`.
    pub thresholds: AdaptationThresholds,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.9,
            exploration_rate: 0.1,
            adaptation_strategy: AdaptationStrategy::Gradual,
            learning_enabled: true,
            frequency_threshold: 3,
            experience_buffer_size: 1000,
            sequence_window: 100,
            thresholds: AdaptationThresholds::default(),
        }
    }
}

impl LearningConfig {
    /// Validate parameter ranges, consuming and returning the config.
    ///
    /// A bad configuration is a programmer error, so this fails at
    /// construction time rather than surfacing later at runtime.
    pub fn validated(self) -> LearningResult<Self> {
        check_rate("learning_rate", self.learning_rate)?;
        check_rate("discount_factor", self.discount_factor)?;
        check_rate("exploration_rate", self.exploration_rate)?;
        if self.experience_buffer_size == 0 {
            return Err(LearningError::Config {
                message: "experience_buffer_size must be positive".to_string(),
            });
        }
        Ok(self)
    }

    /// Load from environment variables, validating parameter ranges.
    pub fn from_env() -> LearningResult<Self> {
        let adaptation_strategy = match env::var("LEARNING_ADAPTATION_STRATEGY") {
            Ok(s) => s
                .parse::<AdaptationStrategy>()
                .map_err(|message| LearningError::Config { message })?,
            Err(_) => AdaptationStrategy::Gradual,
        };

        let defaults = AdaptationThresholds::default();
        let thresholds = AdaptationThresholds {
            min_success_rate: env_f64("LEARNING_MIN_SUCCESS_RATE", defaults.min_success_rate),
            max_error_rate: env_f64("LEARNING_MAX_ERROR_RATE", defaults.max_error_rate),
            max_execution_time: env_f64("LEARNING_MAX_EXECUTION_TIME", defaults.max_execution_time),
            ..defaults
        };

        Self {
            learning_rate: env_f64("LEARNING_RATE", 0.1),
            discount_factor: env_f64("LEARNING_DISCOUNT_FACTOR", 0.9),
            exploration_rate: env_f64("LEARNING_EXPLORATION_RATE", 0.1),
            adaptation_strategy,
            learning_enabled: env::var("LEARNING_ENABLED")
                .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
                .unwrap_or(true),
            frequency_threshold: env::var("LEARNING_FREQUENCY_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            experience_buffer_size: env::var("LEARNING_EXPERIENCE_BUFFER_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            sequence_window: env::var("LEARNING_SEQUENCE_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            thresholds,
        }
        .validated()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> LearningResult<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let learning = LearningConfig::from_env()?;

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/learning.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        Ok(Config { learning, database })
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/learning.db"),
            max_connections: 5,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn check_rate(name: &str, value: f64) -> LearningResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(LearningError::Config {
            message: format!("{} must be in (0, 1], got {}", name, value),
        })
    }
}
